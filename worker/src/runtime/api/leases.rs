//! containerd.services.leases.v1.Leases client.

use std::collections::HashMap;

use tonic::codegen::*;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Lease {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(map = "string, string", tag = "3")]
	pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRequest {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(map = "string, string", tag = "3")]
	pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateResponse {
	#[prost(message, optional, tag = "1")]
	pub lease: Option<Lease>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(bool, tag = "2")]
	pub sync: bool,
}

#[derive(Debug, Clone)]
pub struct LeasesClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> LeasesClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		LeasesClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	pub async fn create(
		&mut self,
		request: impl tonic::IntoRequest<CreateRequest>,
	) -> Result<tonic::Response<CreateResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.leases.v1.Leases/Create");
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn delete(
		&mut self,
		request: impl tonic::IntoRequest<DeleteRequest>,
	) -> Result<tonic::Response<()>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.leases.v1.Leases/Delete");
		self.inner.unary(request.into_request(), path, codec).await
	}
}
