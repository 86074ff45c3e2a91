//! Client facade
//!
//! A thin wrapper around one [`Endpoint`] talking to a broker. It has no
//! loop of its own: the application calls [`Client::receive`] and
//! [`Client::flush`] from whatever loop it already runs.

use std::time::{Duration, Instant};

use log::debug;
use serde_json::Value;

use crate::config::EndpointConfig;
use crate::connection::{CloseReason, Endpoint, HasEndpoint};
use crate::egress::EnqueueOutcome;
use crate::error::ClientError;
use crate::protocol::{is_control_type, Envelope};
use crate::topics::TypeName;
use crate::traits::{Delay, Stream};

pub struct Client<S: Stream> {
    name: String,
    endpoint: Endpoint<S>,
}

impl<S: Stream> Client<S> {
    /// Wrap a connected, non-blocking stream
    pub fn new(name: impl Into<String>, stream: S, config: EndpointConfig) -> Self {
        let name = name.into();
        debug!("Client '{}' connected", name);
        Self {
            name,
            endpoint: Endpoint::new(stream, config),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a subscription request for `message_type`
    pub fn subscribe(&mut self, message_type: &str) -> Result<(), ClientError> {
        let message_type = TypeName::try_from(message_type).map_err(|_| ClientError::EmptyType)?;
        self.enqueue(&Envelope::subscribe(&message_type))
    }

    /// Queue an unsubscription request for `message_type`
    pub fn unsubscribe(&mut self, message_type: &str) -> Result<(), ClientError> {
        let message_type = TypeName::try_from(message_type).map_err(|_| ClientError::EmptyType)?;
        self.enqueue(&Envelope::unsubscribe(&message_type))
    }

    /// Queue a publish of `entity` under `message_type`
    pub fn send(&mut self, message_type: &str, entity: impl Into<Value>) -> Result<(), ClientError> {
        if message_type.is_empty() {
            return Err(ClientError::EmptyType);
        }
        if is_control_type(message_type) {
            return Err(ClientError::ReservedType(message_type.to_string()));
        }
        self.enqueue(&Envelope::new(message_type, entity))
    }

    /// Envelopes completed by one non-blocking read
    pub fn receive(&mut self) -> Vec<Envelope> {
        self.endpoint.read_available()
    }

    /// One non-blocking write; returns bytes written
    pub fn flush(&mut self) -> usize {
        self.endpoint.flush_outbound()
    }

    /// Flush until nothing is queued or `timeout` elapses
    pub fn flush_blocking<D: Delay>(
        &mut self,
        delay: &D,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        // too far out to represent means no deadline
        let deadline = Instant::now().checked_add(timeout);

        while self.endpoint.pending_outbound() > 0 {
            if self.endpoint.flush_outbound() > 0 {
                continue;
            }
            self.ensure_alive()?;
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(ClientError::FlushTimeout {
                    pending: self.endpoint.pending_outbound(),
                });
            }
            delay.sleep_ms(1);
        }

        self.ensure_alive()
    }

    pub fn pending_outbound(&self) -> usize {
        self.endpoint.pending_outbound()
    }

    pub fn is_alive(&self) -> bool {
        self.endpoint.is_alive()
    }

    fn enqueue(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        self.ensure_alive()?;
        match self.endpoint.enqueue_outbound(envelope)? {
            EnqueueOutcome::Overflow | EnqueueOutcome::Discarded => self.ensure_alive(),
            _ => Ok(()),
        }
    }

    fn ensure_alive(&self) -> Result<(), ClientError> {
        match self.endpoint.close_reason() {
            Some(reason) => Err(ClientError::Closed(reason.clone())),
            None => Ok(()),
        }
    }
}

impl<S: Stream> HasEndpoint for Client<S> {
    type Stream = S;

    fn endpoint(&self) -> &Endpoint<S> {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut Endpoint<S> {
        &mut self.endpoint
    }
}

impl<S: Stream> Drop for Client<S> {
    fn drop(&mut self) {
        if self.endpoint.is_alive() {
            self.endpoint.close(CloseReason::Local);
            debug!("Client '{}' closed socket", self.name);
        }
    }
}
