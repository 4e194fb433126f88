use std::collections::HashMap;

/// containerd.types.Descriptor
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Descriptor {
	#[prost(string, tag = "1")]
	pub media_type: String,
	#[prost(string, tag = "2")]
	pub digest: String,
	#[prost(int64, tag = "3")]
	pub size: i64,
	#[prost(map = "string, string", tag = "5")]
	pub annotations: HashMap<String, String>,
}

/// containerd.types.Mount
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Mount {
	#[prost(string, tag = "1")]
	pub fs_type: String,
	#[prost(string, tag = "2")]
	pub source: String,
	#[prost(string, tag = "3")]
	pub target: String,
	#[prost(string, repeated, tag = "4")]
	pub options: Vec<String>,
}

/// containerd.v1.types.Process
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Process {
	#[prost(string, tag = "1")]
	pub container_id: String,
	#[prost(string, tag = "2")]
	pub id: String,
	#[prost(uint32, tag = "3")]
	pub pid: u32,
	#[prost(enumeration = "ProcessStatus", tag = "4")]
	pub status: i32,
	#[prost(uint32, tag = "9")]
	pub exit_status: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProcessStatus {
	Unknown = 0,
	Created = 1,
	Running = 2,
	Stopped = 3,
	Paused = 4,
	Pausing = 5,
}
