//! Dispatch of inbound messages to per-type handlers

use crate::context::ServerContext;
use crate::error::HandlerError;
use log::{trace, warn};
use shared::{Message, MessageType};
use std::collections::HashMap;

pub trait MessageHandler: Send {
    fn handle(&self, message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(Message, &mut ServerContext) -> Result<(), HandlerError> + Send,
{
    fn handle(&self, message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
        self(message, ctx)
    }
}

#[derive(Default)]
pub struct MessageRouter {
    handlers: HashMap<MessageType, Box<dyn MessageHandler>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// First registration for a type wins; later ones are logged and ignored
    pub fn register<H: MessageHandler + 'static>(
        &mut self,
        message_type: MessageType,
        handler: H,
    ) -> bool {
        if self.handlers.contains_key(&message_type) {
            warn!(
                "Handler for {:?} already registered, ignoring",
                message_type
            );
            return false;
        }
        self.handlers.insert(message_type, Box::new(handler));
        true
    }

    pub fn is_registered(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Runs the handler for the message's type. Unknown and unhandled types
    /// are dropped; handler failures are logged and contained.
    ///
    /// Returns `true` if a handler ran to completion.
    pub fn dispatch(&self, message: Message, ctx: &mut ServerContext) -> bool {
        let Some(message_type) = message.kind() else {
            trace!(
                "Ignoring unknown message type {} from {}",
                message.header.message_type,
                message.header.client_id
            );
            return false;
        };
        let Some(handler) = self.handlers.get(&message_type) else {
            trace!("No handler for {:?}", message_type);
            return false;
        };

        let client_id = message.header.client_id;
        match handler.handle(message, ctx) {
            Ok(()) => true,
            Err(e) => {
                warn!("{:?} from {} failed: {}", message_type, client_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use shared::{ClientId, Header, Payload};

    fn message(message_type: MessageType) -> Message {
        Message::new(Header::new(ClientId(1), 1, message_type), Payload::new())
    }

    #[test]
    fn test_routes_to_registered_handler() {
        let mut router = MessageRouter::new();
        router.register(
            MessageType::Command,
            |message: Message, ctx: &mut ServerContext| -> Result<(), HandlerError> {
                ctx.console.push(format!("from {}", message.header.client_id));
                Ok(())
            },
        );

        let mut ctx = test_context();
        assert!(router.dispatch(message(MessageType::Command), &mut ctx));
        assert_eq!(ctx.console, vec!["from #1".to_string()]);
    }

    #[test]
    fn test_first_registration_wins() {
        let mut router = MessageRouter::new();
        assert!(router.register(
            MessageType::Command,
            |_: Message, ctx: &mut ServerContext| -> Result<(), HandlerError> {
                ctx.console.push("first".to_string());
                Ok(())
            },
        ));
        assert!(!router.register(
            MessageType::Command,
            |_: Message, ctx: &mut ServerContext| -> Result<(), HandlerError> {
                ctx.console.push("second".to_string());
                Ok(())
            },
        ));

        let mut ctx = test_context();
        router.dispatch(message(MessageType::Command), &mut ctx);
        assert_eq!(ctx.console, vec!["first".to_string()]);
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let router = MessageRouter::new();
        let mut ctx = test_context();
        let mut unknown = message(MessageType::None);
        unknown.header.message_type = 250;

        assert!(!router.dispatch(unknown, &mut ctx));
        assert!(!router.dispatch(message(MessageType::Spawn), &mut ctx));
    }

    #[test]
    fn test_handler_error_is_contained() {
        let mut router = MessageRouter::new();
        router.register(
            MessageType::Action,
            |message: Message, _: &mut ServerContext| -> Result<(), HandlerError> {
                Err(HandlerError::NotSpawned(message.header.client_id))
            },
        );

        let mut ctx = test_context();
        assert!(!router.dispatch(message(MessageType::Action), &mut ctx));
        assert!(ctx.running);
    }
}
