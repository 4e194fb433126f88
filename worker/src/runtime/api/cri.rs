//! runtime.v1.ImageService client, used only as the pull side channel.
//! CRI calls do not take the containerd-namespace header.

use std::collections::HashMap;

use tonic::codegen::*;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageSpec {
	#[prost(string, tag = "1")]
	pub image: String,
	#[prost(map = "string, string", tag = "2")]
	pub annotations: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthConfig {
	#[prost(string, tag = "1")]
	pub username: String,
	#[prost(string, tag = "2")]
	pub password: String,
	#[prost(string, tag = "3")]
	pub auth: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PullImageRequest {
	#[prost(message, optional, tag = "1")]
	pub image: Option<ImageSpec>,
	#[prost(message, optional, tag = "2")]
	pub auth: Option<AuthConfig>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PullImageResponse {
	#[prost(string, tag = "1")]
	pub image_ref: String,
}

#[derive(Debug, Clone)]
pub struct CriImageClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> CriImageClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		CriImageClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	pub async fn pull_image(
		&mut self,
		request: impl tonic::IntoRequest<PullImageRequest>,
	) -> Result<tonic::Response<PullImageResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path = http::uri::PathAndQuery::from_static("/runtime.v1.ImageService/PullImage");
		self.inner.unary(request.into_request(), path, codec).await
	}
}
