//! Participant struct definition
//!
//! Represents a registered chat member and the mailbox feeding its
//! connection's writer task. A mailbox pairs the bounded outbound queue
//! with a one-shot slot for the final notice (kick or shutdown), which is
//! written after the queue drains and can never be crowded out by it.

use std::net::SocketAddr;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::error::SendError;
use crate::message::Response;
use crate::types::{ClientId, Nickname};

/// Create a mailbox whose queue holds up to `capacity` responses
pub fn mailbox(capacity: usize) -> (Outbox, Inbox) {
    let (queue_tx, queue_rx) = mpsc::channel(capacity);
    let (farewell_tx, farewell_rx) = oneshot::channel();
    (
        Outbox {
            queue: queue_tx,
            farewell: farewell_tx,
        },
        Inbox {
            queue: queue_rx,
            farewell: Some(farewell_rx),
        },
    )
}

/// Sending half of a mailbox, owned by the registered participant
#[derive(Debug)]
pub struct Outbox {
    queue: mpsc::Sender<Response>,
    farewell: oneshot::Sender<Response>,
}

/// Receiving half of a mailbox, drained by the writer task
#[derive(Debug)]
pub struct Inbox {
    queue: mpsc::Receiver<Response>,
    farewell: Option<oneshot::Receiver<Response>>,
}

impl Inbox {
    /// Next response to write; `None` once the participant is gone
    ///
    /// Queued responses come first. The final notice, if one was left,
    /// follows once the queue has closed.
    pub async fn recv(&mut self) -> Option<Response> {
        if let Some(response) = self.queue.recv().await {
            return Some(response);
        }
        self.farewell.take()?.await.ok()
    }
}

/// Registered chat member
///
/// The outbox is the participant's only handle on its connection.
/// Dropping the participant closes the queue, which lets the writer task
/// flush and shut the socket down.
#[derive(Debug)]
pub struct Participant {
    /// Identity assigned at admission
    pub id: ClientId,
    /// Nickname, unique among registered participants
    pub nickname: Nickname,
    /// Remote address of the connection
    pub addr: SocketAddr,
    outbox: Outbox,
}

impl Participant {
    pub fn new(id: ClientId, nickname: Nickname, addr: SocketAddr, outbox: Outbox) -> Self {
        Self {
            id,
            nickname,
            addr,
            outbox,
        }
    }

    /// Queue a response for this participant without waiting
    ///
    /// A full queue means the peer is not reading; the message is dropped
    /// rather than stalling the caller.
    pub fn deliver(&self, response: Response) -> Result<(), SendError> {
        self.outbox.queue.try_send(response).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Leave a final notice and close the mailbox
    ///
    /// The notice is written after everything already queued, however
    /// full the queue is.
    pub fn dismiss(self, notice: Response) -> Result<(), SendError> {
        self.outbox
            .farewell
            .send(notice)
            .map_err(|_| SendError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ResponseCode;

    fn participant(outbox: Outbox) -> Participant {
        Participant::new(
            ClientId(1),
            Nickname::parse("alice").unwrap(),
            "127.0.0.1:40000".parse().unwrap(),
            outbox,
        )
    }

    #[tokio::test]
    async fn test_deliver_queues_response() {
        let (outbox, mut inbox) = mailbox(4);
        let p = participant(outbox);

        p.deliver(Response::reply("hello")).unwrap();
        let got = inbox.recv().await.unwrap();
        assert_eq!(got.code, ResponseCode::Reply);
        assert_eq!(got.message, "hello");
    }

    #[tokio::test]
    async fn test_deliver_reports_full_and_closed() {
        let (outbox, inbox) = mailbox(1);
        let p = participant(outbox);

        p.deliver(Response::ping_ack()).unwrap();
        assert_eq!(p.deliver(Response::ping_ack()), Err(SendError::QueueFull));

        drop(inbox);
        assert_eq!(p.deliver(Response::ping_ack()), Err(SendError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_dismiss_on_full_queue_still_delivers_notice_last() {
        let (outbox, mut inbox) = mailbox(2);
        let p = participant(outbox);

        p.deliver(Response::reply("one")).unwrap();
        p.deliver(Response::reply("two")).unwrap();
        assert_eq!(p.deliver(Response::reply("three")), Err(SendError::QueueFull));
        p.dismiss(Response::error("bye")).unwrap();

        let mut received = Vec::new();
        while let Some(res) = inbox.recv().await {
            received.push(res.message);
        }
        assert_eq!(received, vec!["one", "two", "bye"]);
    }

    #[tokio::test]
    async fn test_dropped_participant_ends_inbox_without_notice() {
        let (outbox, mut inbox) = mailbox(2);
        let p = participant(outbox);
        p.deliver(Response::reply("last")).unwrap();
        drop(p);

        assert_eq!(inbox.recv().await.unwrap().message, "last");
        assert!(inbox.recv().await.is_none());
        assert!(inbox.recv().await.is_none());
    }
}
