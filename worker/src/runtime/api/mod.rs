//! Hand-maintained mirrors of the containerd gRPC surface this agent
//! consumes (images, content, snapshots, diff, leases, containers, tasks)
//! plus the CRI image service used for pulls.
//!
//! Message tags track the public containerd v1 protos. Only fields the
//! engine touches are declared; the protobuf wire format skips the rest.
//! Checked in so the build needs no protoc.

pub mod containers;
pub mod content;
pub mod cri;
pub mod diff;
pub mod images;
pub mod leases;
pub mod snapshots;
pub mod tasks;
pub mod types;
