//! containerd.services.images.v1.Images client.

use std::collections::HashMap;

use tonic::codegen::*;

use super::types::Descriptor;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Image {
	#[prost(string, tag = "1")]
	pub name: String,
	#[prost(map = "string, string", tag = "2")]
	pub labels: HashMap<String, String>,
	#[prost(message, optional, tag = "3")]
	pub target: Option<Descriptor>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetImageRequest {
	#[prost(string, tag = "1")]
	pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetImageResponse {
	#[prost(message, optional, tag = "1")]
	pub image: Option<Image>,
}

#[derive(Debug, Clone)]
pub struct ImagesClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> ImagesClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		ImagesClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	pub async fn get(
		&mut self,
		request: impl tonic::IntoRequest<GetImageRequest>,
	) -> Result<tonic::Response<GetImageResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.images.v1.Images/Get");
		self.inner.unary(request.into_request(), path, codec).await
	}
}
