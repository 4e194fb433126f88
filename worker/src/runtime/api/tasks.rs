//! containerd.services.tasks.v1.Tasks client.

use tonic::codegen::*;

use super::types::{Descriptor, Mount, Process};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateTaskRequest {
	#[prost(string, tag = "1")]
	pub container_id: String,
	#[prost(message, repeated, tag = "3")]
	pub rootfs: Vec<Mount>,
	#[prost(string, tag = "4")]
	pub stdin: String,
	#[prost(string, tag = "5")]
	pub stdout: String,
	#[prost(string, tag = "6")]
	pub stderr: String,
	#[prost(bool, tag = "7")]
	pub terminal: bool,
	#[prost(message, optional, tag = "8")]
	pub checkpoint: Option<Descriptor>,
	#[prost(message, optional, tag = "9")]
	pub options: Option<::prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateTaskResponse {
	#[prost(string, tag = "1")]
	pub container_id: String,
	#[prost(uint32, tag = "2")]
	pub pid: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartRequest {
	#[prost(string, tag = "1")]
	pub container_id: String,
	#[prost(string, tag = "2")]
	pub exec_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartResponse {
	#[prost(uint32, tag = "1")]
	pub pid: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KillRequest {
	#[prost(string, tag = "1")]
	pub container_id: String,
	#[prost(string, tag = "2")]
	pub exec_id: String,
	#[prost(uint32, tag = "3")]
	pub signal: u32,
	#[prost(bool, tag = "4")]
	pub all: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTaskRequest {
	#[prost(string, tag = "1")]
	pub container_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteResponse {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(uint32, tag = "2")]
	pub pid: u32,
	#[prost(uint32, tag = "3")]
	pub exit_status: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRequest {
	#[prost(string, tag = "1")]
	pub container_id: String,
	#[prost(string, tag = "2")]
	pub exec_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResponse {
	#[prost(message, optional, tag = "1")]
	pub process: Option<Process>,
}

#[derive(Debug, Clone)]
pub struct TasksClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> TasksClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		TasksClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	pub async fn create(
		&mut self,
		request: impl tonic::IntoRequest<CreateTaskRequest>,
	) -> Result<tonic::Response<CreateTaskResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.tasks.v1.Tasks/Create");
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn start(
		&mut self,
		request: impl tonic::IntoRequest<StartRequest>,
	) -> Result<tonic::Response<StartResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.tasks.v1.Tasks/Start");
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn kill(
		&mut self,
		request: impl tonic::IntoRequest<KillRequest>,
	) -> Result<tonic::Response<()>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.tasks.v1.Tasks/Kill");
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn delete(
		&mut self,
		request: impl tonic::IntoRequest<DeleteTaskRequest>,
	) -> Result<tonic::Response<DeleteResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.tasks.v1.Tasks/Delete");
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn get(
		&mut self,
		request: impl tonic::IntoRequest<GetRequest>,
	) -> Result<tonic::Response<GetResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path =
			http::uri::PathAndQuery::from_static("/containerd.services.tasks.v1.Tasks/Get");
		self.inner.unary(request.into_request(), path, codec).await
	}
}
