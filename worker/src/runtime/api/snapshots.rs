//! containerd.services.snapshots.v1.Snapshots client.

use std::collections::HashMap;

use tonic::codegen::*;

use super::types::Mount;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum Kind {
	Unknown = 0,
	View = 1,
	Active = 2,
	Committed = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Info {
	#[prost(enumeration = "Kind", tag = "1")]
	pub kind: i32,
	#[prost(string, tag = "2")]
	pub name: String,
	#[prost(string, tag = "3")]
	pub parent: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareSnapshotRequest {
	#[prost(string, tag = "1")]
	pub snapshotter: String,
	#[prost(string, tag = "2")]
	pub key: String,
	#[prost(string, tag = "3")]
	pub parent: String,
	#[prost(map = "string, string", tag = "4")]
	pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareSnapshotResponse {
	#[prost(message, repeated, tag = "1")]
	pub mounts: Vec<Mount>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitSnapshotRequest {
	#[prost(string, tag = "1")]
	pub snapshotter: String,
	#[prost(string, tag = "2")]
	pub name: String,
	#[prost(string, tag = "3")]
	pub key: String,
	#[prost(map = "string, string", tag = "4")]
	pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatSnapshotRequest {
	#[prost(string, tag = "1")]
	pub snapshotter: String,
	#[prost(string, tag = "2")]
	pub key: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatSnapshotResponse {
	#[prost(message, optional, tag = "1")]
	pub info: Option<Info>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoveSnapshotRequest {
	#[prost(string, tag = "1")]
	pub snapshotter: String,
	#[prost(string, tag = "2")]
	pub key: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotsClient<T> {
	inner: tonic::client::Grpc<T>,
}

impl<T> SnapshotsClient<T>
where
	T: tonic::client::GrpcService<tonic::body::BoxBody>,
	T::Error: Into<StdError>,
	T::ResponseBody: Body<Data = Bytes> + Send + 'static,
	<T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
	pub fn new(inner: T) -> Self {
		SnapshotsClient {
			inner: tonic::client::Grpc::new(inner),
		}
	}

	pub async fn prepare(
		&mut self,
		request: impl tonic::IntoRequest<PrepareSnapshotRequest>,
	) -> Result<tonic::Response<PrepareSnapshotResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path = http::uri::PathAndQuery::from_static(
			"/containerd.services.snapshots.v1.Snapshots/Prepare",
		);
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn commit(
		&mut self,
		request: impl tonic::IntoRequest<CommitSnapshotRequest>,
	) -> Result<tonic::Response<()>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path = http::uri::PathAndQuery::from_static(
			"/containerd.services.snapshots.v1.Snapshots/Commit",
		);
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn stat(
		&mut self,
		request: impl tonic::IntoRequest<StatSnapshotRequest>,
	) -> Result<tonic::Response<StatSnapshotResponse>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path = http::uri::PathAndQuery::from_static(
			"/containerd.services.snapshots.v1.Snapshots/Stat",
		);
		self.inner.unary(request.into_request(), path, codec).await
	}

	pub async fn remove(
		&mut self,
		request: impl tonic::IntoRequest<RemoveSnapshotRequest>,
	) -> Result<tonic::Response<()>, tonic::Status> {
		self.inner.ready().await.map_err(|e| {
			tonic::Status::new(
				tonic::Code::Unknown,
				format!("Service was not ready: {}", e.into()),
			)
		})?;
		let codec = tonic::codec::ProstCodec::default();
		let path = http::uri::PathAndQuery::from_static(
			"/containerd.services.snapshots.v1.Snapshots/Remove",
		);
		self.inner.unary(request.into_request(), path, codec).await
	}
}
