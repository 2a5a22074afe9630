//! Delivery policies over the registry
//!
//! Every function queues a copy of the response for each target and returns
//! how many queues accepted it. A failed delivery is logged and skipped; it
//! never stops delivery to the remaining targets.

use tracing::warn;

use crate::message::Response;
use crate::participant::Participant;
use crate::registry::Registry;
use crate::types::ClientId;

/// Deliver to everyone except `exclude` (`None` for room announcements)
pub fn broadcast(registry: &Registry, response: &Response, exclude: Option<ClientId>) -> usize {
    deliver_all(
        registry.iter().filter(|p| Some(p.id) != exclude),
        response,
    )
}

/// Deliver only to the participant currently holding `receiver`
///
/// Nobody holding that nickname (e.g. they just left) is not an error.
pub fn directed_send(registry: &Registry, response: &Response, receiver: &str) -> usize {
    deliver_all(registry.find_by_nickname(receiver).into_iter(), response)
}

/// Deliver to everyone except the two named participants
pub fn exclusion_send(
    registry: &Registry,
    response: &Response,
    sender: &str,
    receiver: &str,
) -> usize {
    deliver_all(
        registry.iter().filter(|p| {
            let nick = p.nickname.as_str();
            nick != sender && nick != receiver
        }),
        response,
    )
}

fn deliver_all<'a>(targets: impl Iterator<Item = &'a Participant>, response: &Response) -> usize {
    let mut delivered = 0;
    for participant in targets {
        match participant.deliver(response.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(
                    to = %participant.nickname,
                    id = %participant.id,
                    "Dropping message: {}",
                    e
                );
            }
        }
    }
    delivered
}
