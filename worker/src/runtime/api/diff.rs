//! containerd.services.diff.v1.Diff client (Apply only).

use std::collections::HashMap;

use tonic::codegen::*;

use super::types::{Descriptor, Mount};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyRequest {
	#[prost(message, optional, tag = "1")]
	pub diff: Option<Descriptor>,
	#[prost(message, repeated, tag = "2")]
	pub mounts: Vec<Mount>,
	#[prost(map = "string, message", tag = "3")]
	pub payloads: HashMap<String, ::prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyResponse {
	#[prost(message, optional, tag = "1")]
	pub applied: Option<Descriptor>,
}

#[derive(Debug, Clone)]
pub struct DiffClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> DiffClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		DiffClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	/// Unpack one layer blob onto the given snapshot mounts.
	pub async fn apply(
		&mut self,
		request: impl tonic::IntoRequest<ApplyRequest>,
	) -> Result<tonic::Response<ApplyResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.diff.v1.Diff/Apply");
		self.inner.unary(request.into_request(), path, codec).await
	}
}
