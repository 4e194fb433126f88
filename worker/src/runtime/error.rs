use std::fmt;

/// Where in the pod lifecycle an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	Unpack,
	Snapshot,
	Spec,
	Create,
	Start,
	Cni,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Stage::Unpack => "unpack",
			Stage::Snapshot => "snapshot",
			Stage::Spec => "spec",
			Stage::Create => "create",
			Stage::Start => "start",
			Stage::Cni => "cni",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	ImageInvalid,
	ContentMissing,
	RuntimeRpc,
	CniFailed,
	CniTimeout,
	Internal,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorKind::NotFound => "not_found",
			ErrorKind::ImageInvalid => "image_invalid",
			ErrorKind::ContentMissing => "content_missing",
			ErrorKind::RuntimeRpc => "runtime_rpc",
			ErrorKind::CniFailed => "cni_failed",
			ErrorKind::CniTimeout => "cni_timeout",
			ErrorKind::Internal => "internal",
		};
		f.write_str(name)
	}
}

/// Structured pod-engine error: a kind discriminant, the lifecycle stage it
/// happened in and an optional remediation hint. Retry decisions belong to
/// the caller.
#[derive(Debug)]
pub struct EngineError {
	pub kind: ErrorKind,
	pub stage: Stage,
	pub message: String,
	pub hint: Option<String>,
	code: Option<tonic::Code>,
}

impl fmt::Display for EngineError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} at {} stage: {}", self.kind, self.stage, self.message)?;
		if let Some(hint) = &self.hint {
			write!(f, " ({hint})")?;
		}
		Ok(())
	}
}

impl std::error::Error for EngineError {}

impl EngineError {
	pub fn new(kind: ErrorKind, stage: Stage, message: impl Into<String>) -> Self {
		EngineError {
			kind,
			stage,
			message: message.into(),
			hint: None,
			code: None,
		}
	}

	pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
		self.hint = Some(hint.into());
		self
	}

	/// Classify a gRPC status from the runtime.
	pub fn from_status(stage: Stage, status: tonic::Status) -> Self {
		let kind = match status.code() {
			tonic::Code::NotFound => ErrorKind::NotFound,
			_ => ErrorKind::RuntimeRpc,
		};
		EngineError {
			kind,
			stage,
			message: format!("{}: {}", code_name(status.code()), status.message()),
			hint: None,
			code: Some(status.code()),
		}
	}

	pub fn code(&self) -> Option<tonic::Code> {
		self.code
	}

	/// Only transient runtime failures are worth retrying.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self.code,
			Some(tonic::Code::Unavailable) | Some(tonic::Code::DeadlineExceeded)
		)
	}
}

fn code_name(code: tonic::Code) -> &'static str {
	match code {
		tonic::Code::Ok => "OK",
		tonic::Code::Cancelled => "CANCELLED",
		tonic::Code::InvalidArgument => "INVALID_ARGUMENT",
		tonic::Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
		tonic::Code::NotFound => "NOT_FOUND",
		tonic::Code::AlreadyExists => "ALREADY_EXISTS",
		tonic::Code::PermissionDenied => "PERMISSION_DENIED",
		tonic::Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
		tonic::Code::FailedPrecondition => "FAILED_PRECONDITION",
		tonic::Code::Aborted => "ABORTED",
		tonic::Code::Unimplemented => "UNIMPLEMENTED",
		tonic::Code::Unavailable => "UNAVAILABLE",
		tonic::Code::Unauthenticated => "UNAUTHENTICATED",
		_ => "UNKNOWN",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_carries_kind_stage_and_hint() {
		let err = EngineError::new(ErrorKind::ContentMissing, Stage::Unpack, "blob sha256:aa")
			.with_hint("pull the image first");
		let text = err.to_string();
		assert!(text.contains("content_missing"));
		assert!(text.contains("unpack"));
		assert!(text.contains("pull the image first"));
	}

	#[test]
	fn status_classification() {
		let not_found =
			EngineError::from_status(Stage::Unpack, tonic::Status::not_found("no such image"));
		assert_eq!(not_found.kind, ErrorKind::NotFound);
		assert!(!not_found.is_retryable());

		let unavailable =
			EngineError::from_status(Stage::Start, tonic::Status::unavailable("socket down"));
		assert_eq!(unavailable.kind, ErrorKind::RuntimeRpc);
		assert!(unavailable.is_retryable());
	}
}
