// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! WebSocket fan-out: one JSON frame per event, client frames ignored. A
//! failing or slow subscriber is dropped without affecting the others.

use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL, UPGRADE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, warn};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};
use tokio_tungstenite::WebSocketStream;

use crate::api::error::ApiError;
use crate::api::{ApiResponse, Context};
use crate::events::ApiEvent;
use crate::util::Shutdown;

pub(crate) fn is_websocket_upgrade(request: &Request<Incoming>) -> bool {
	request
		.headers()
		.get(UPGRADE)
		.and_then(|v| v.to_str().ok())
		.is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Completes the upgrade handshake and spawns the subscriber pump. Callers
/// have already authenticated the request.
pub(crate) fn handle_websocket(
	context: &Context, mut request: Request<Incoming>,
) -> Result<ApiResponse, ApiError> {
	let key = request
		.headers()
		.get(SEC_WEBSOCKET_KEY)
		.ok_or_else(|| ApiError::BadRequest("missing Sec-WebSocket-Key".to_string()))?;
	let accept = derive_accept_key(key.as_bytes());
	let protocol = request.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned();

	let bus = context.bus.clone();
	let shutdown = context.shutdown.clone();
	tokio::spawn(async move {
		match hyper::upgrade::on(&mut request).await {
			Ok(upgraded) => {
				let stream = WebSocketStream::from_raw_socket(
					TokioIo::new(upgraded),
					Role::Server,
					None,
				)
				.await;
				serve_subscriber(stream, bus.subscribe(), shutdown).await;
			},
			Err(e) => warn!("WebSocket upgrade failed: {}", e),
		}
	});

	let mut response = Response::builder()
		.status(StatusCode::SWITCHING_PROTOCOLS)
		.header(CONNECTION, "Upgrade")
		.header(UPGRADE, "websocket")
		.header(SEC_WEBSOCKET_ACCEPT, accept);
	if let Some(protocol) = protocol {
		response = response.header(SEC_WEBSOCKET_PROTOCOL, protocol);
	}
	// unwrap safety: body only errors when previous chained calls failed.
	Ok(response.body(Full::new(Bytes::new())).unwrap())
}

async fn serve_subscriber<S>(
	mut stream: WebSocketStream<S>, mut events: broadcast::Receiver<ApiEvent>, shutdown: Shutdown,
) where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	loop {
		tokio::select! {
			_ = shutdown.recv() => {
				let _ = stream.close(None).await;
				break;
			},
			event = events.recv() => match event {
				Ok(event) => {
					let frame = match serde_json::to_string(&event) {
						Ok(frame) => frame,
						Err(e) => {
							warn!("Failed to serialize event frame: {}", e);
							continue;
						},
					};
					if stream.send(Message::Text(frame)).await.is_err() {
						debug!("Dropping failed WebSocket subscriber");
						break;
					}
				},
				Err(broadcast::error::RecvError::Lagged(n)) => {
					debug!("WebSocket subscriber lagged by {} events", n);
				},
				Err(broadcast::error::RecvError::Closed) => break,
			},
			// Client-to-server frames are ignored; only EOF ends the session.
			message = stream.next() => match message {
				Some(Ok(_)) => {},
				_ => break,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::EventsBus;
	use crate::types::Preimage;

	fn received(amount_sat: u64) -> ApiEvent {
		ApiEvent::PaymentReceived {
			amount_sat,
			payment_hash: Preimage([1; 32]).payment_hash(),
			external_id: None,
		}
	}

	#[tokio::test]
	async fn one_json_frame_per_event_and_client_frames_are_ignored() {
		let (client_io, server_io) = tokio::io::duplex(4_096);
		let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
		let mut client =
			WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

		let bus: EventsBus<ApiEvent> = EventsBus::new();
		let shutdown = Shutdown::new();
		let pump = tokio::spawn(serve_subscriber(server, bus.subscribe(), shutdown.clone()));

		bus.notify(received(21));
		let frame = client.next().await.unwrap().unwrap();
		let value: serde_json::Value =
			serde_json::from_str(frame.to_text().unwrap()).unwrap();
		assert_eq!(value["type"], "payment_received");
		assert_eq!(value["amountSat"], 21);

		// A client-to-server frame changes nothing; the next frame out is
		// still the next event.
		client.send(Message::Text("hello?".to_string())).await.unwrap();
		bus.notify(received(42));
		let frame = client.next().await.unwrap().unwrap();
		let value: serde_json::Value =
			serde_json::from_str(frame.to_text().unwrap()).unwrap();
		assert_eq!(value["amountSat"], 42);

		shutdown.trigger();
		pump.await.unwrap();
		// The server said goodbye cleanly.
		assert!(matches!(client.next().await, Some(Ok(Message::Close(_)))));
	}
}
