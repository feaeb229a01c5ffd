//! Ways to reach a device.

use std::{sync::Arc, time::Duration};

use grove_lcd_driver::{
	Grove, I2cChannel,
	rpc::{self, Request, Response},
};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::{debug, instrument, trace};

/// Something that carries requests to a device and brings back its answers.
pub trait Transport {
	fn call(&self, request: Request) -> Result<Response>;

	/// Make a call, turning error responses into errors.
	fn call_ok(&self, request: Request) -> Result<Response> {
		self.call(request)?
			.into_result()
			.into_diagnostic()
			.wrap_err("device refused the call")
	}
}

/// A daemon reached over a ZMQ REQ socket.
pub struct ZmqClient {
	endpoint: String,
	socket: zmq::Socket,
}

impl std::fmt::Debug for ZmqClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ZmqClient")
			.field("endpoint", &self.endpoint)
			.finish_non_exhaustive()
	}
}

impl ZmqClient {
	/// Connect to a daemon. Replies slower than `timeout` are errors.
	pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
		let z = zmq::Context::new();
		let socket = z
			.socket(zmq::REQ)
			.into_diagnostic()
			.wrap_err("zmq: socket(REQ)")?;
		socket
			.set_ipv6(true)
			.into_diagnostic()
			.wrap_err("zmq: set_ipv6")?;

		let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
		socket
			.set_rcvtimeo(millis)
			.into_diagnostic()
			.wrap_err("zmq: set_rcvtimeo")?;
		socket
			.set_linger(0)
			.into_diagnostic()
			.wrap_err("zmq: set_linger")?;
		socket
			.connect(endpoint)
			.into_diagnostic()
			.wrap_err(format!("zmq: connect({endpoint})"))?;
		debug!(endpoint, "connected to daemon");

		Ok(Self {
			endpoint: endpoint.into(),
			socket,
		})
	}
}

impl Transport for ZmqClient {
	#[instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint))]
	fn call(&self, request: Request) -> Result<Response> {
		let bytes = serde_json::to_vec(&request).into_diagnostic()?;
		self.socket
			.send(bytes, 0)
			.into_diagnostic()
			.wrap_err("zmq: send")?;

		let reply = self
			.socket
			.recv_bytes(0)
			.into_diagnostic()
			.wrap_err_with(|| format!("zmq: no reply from {}", self.endpoint))?;
		trace!(reply = %String::from_utf8_lossy(&reply), "received reply");

		serde_json::from_slice(&reply)
			.into_diagnostic()
			.wrap_err("json: failed to parse reply")
	}
}

/// A device in this very process.
#[derive(Debug)]
pub struct LocalClient<C> {
	device: Arc<Grove<C>>,
}

impl<C> LocalClient<C> {
	pub fn new(device: Arc<Grove<C>>) -> Self {
		Self { device }
	}
}

impl<C: I2cChannel> Transport for LocalClient<C> {
	fn call(&self, request: Request) -> Result<Response> {
		Ok(rpc::dispatch(&self.device, request))
	}
}
