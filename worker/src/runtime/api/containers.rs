//! containerd.services.containers.v1.Containers client.

use std::collections::HashMap;

use tonic::codegen::*;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Runtime {
	#[prost(string, tag = "1")]
	pub name: String,
	#[prost(message, optional, tag = "2")]
	pub options: Option<::prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Container {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(map = "string, string", tag = "2")]
	pub labels: HashMap<String, String>,
	#[prost(string, tag = "3")]
	pub image: String,
	#[prost(message, optional, tag = "4")]
	pub runtime: Option<Runtime>,
	#[prost(message, optional, tag = "5")]
	pub spec: Option<::prost_types::Any>,
	#[prost(string, tag = "6")]
	pub snapshotter: String,
	#[prost(string, tag = "7")]
	pub snapshot_key: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateContainerRequest {
	#[prost(message, optional, tag = "1")]
	pub container: Option<Container>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateContainerResponse {
	#[prost(message, optional, tag = "1")]
	pub container: Option<Container>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteContainerRequest {
	#[prost(string, tag = "1")]
	pub id: String,
}

#[derive(Debug, Clone)]
pub struct ContainersClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> ContainersClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		ContainersClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	pub async fn create(
		&mut self,
		request: impl tonic::IntoRequest<CreateContainerRequest>,
	) -> Result<tonic::Response<CreateContainerResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path = http::uri::PathAndQuery::from_static(
			"/containerd.services.containers.v1.Containers/Create",
		);
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn delete(
		&mut self,
		request: impl tonic::IntoRequest<DeleteContainerRequest>,
	) -> Result<tonic::Response<()>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path = http::uri::PathAndQuery::from_static(
			"/containerd.services.containers.v1.Containers/Delete",
		);
		self.inner.unary(request.into_request(), path, codec).await
	}
}
