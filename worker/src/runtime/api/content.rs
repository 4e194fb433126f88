//! containerd.services.content.v1.Content client (read-only subset).

use tonic::codegen::*;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Info {
	#[prost(string, tag = "1")]
	pub digest: String,
	#[prost(int64, tag = "2")]
	pub size: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoRequest {
	#[prost(string, tag = "1")]
	pub digest: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoResponse {
	#[prost(message, optional, tag = "1")]
	pub info: Option<Info>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadContentRequest {
	#[prost(string, tag = "1")]
	pub digest: String,
	#[prost(int64, tag = "2")]
	pub offset: i64,
	#[prost(int64, tag = "3")]
	pub size: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadContentResponse {
	#[prost(int64, tag = "1")]
	pub offset: i64,
	#[prost(bytes = "vec", tag = "2")]
	pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ContentClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> ContentClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		ContentClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	pub async fn info(
		&mut self,
		request: impl tonic::IntoRequest<InfoRequest>,
	) -> Result<tonic::Response<InfoResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.content.v1.Content/Info");
		self.inner.unary(request.into_request(), path, codec).await
	}

	/// Blob bytes arrive as a stream of chunks.
	pub async fn read(
		&mut self,
		request: impl tonic::IntoRequest<ReadContentRequest>,
	) -> Result<tonic::Response<tonic::codec::Streaming<ReadContentResponse>>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.content.v1.Content/Read");
		self.inner
			.server_streaming(request.into_request(), path, codec)
			.await
	}
}
