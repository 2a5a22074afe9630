//! ChatServer Actor implementation
//!
//! The central actor that owns the participant registry. Every join,
//! removal, listing and fan-out is a `ServerCommand` processed one at a
//! time, so registry updates are atomic without any locks.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::AppError;
use crate::message::{Response, KICK_NOTICE, SERVER_CLOSED};
use crate::participant::{Outbox, Participant};
use crate::registry::Registry;
use crate::router;
use crate::types::{ClientId, Nickname};

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Admit a new participant
    Join {
        nickname: Nickname,
        addr: SocketAddr,
        local_addr: SocketAddr,
        outbox: Outbox,
        responder: oneshot::Sender<Result<JoinAck, AppError>>,
    },
    /// Message to everybody but the sender
    Broadcast { client_id: ClientId, text: String },
    /// Member listing back to the sender
    List { client_id: ClientId },
    /// Message to one named participant
    Secret {
        client_id: ClientId,
        receiver: String,
        text: String,
    },
    /// Message to everybody but the sender and one named participant
    Except {
        client_id: ClientId,
        receiver: String,
        text: String,
    },
    /// Response built by the handler, delivered in order with everything else
    Reply {
        client_id: ClientId,
        response: Response,
    },
    /// Moderation removal: kick notice, then leave
    Kick { client_id: ClientId },
    /// Participant left (quit, EOF or transport error)
    Leave { client_id: ClientId },
    /// Counters snapshot
    Stats {
        responder: oneshot::Sender<ServerStats>,
    },
    /// Release every participant with the closing notice; later joins are refused
    Shutdown { responder: oneshot::Sender<usize> },
}

/// Successful admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAck {
    pub client_id: ClientId,
    /// Members including the new one
    pub members: usize,
}

/// Counters kept by the actor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub members: usize,
    pub capacity: usize,
    pub total_joined: u64,
    pub requests: u64,
}

/// The main ChatServer actor
pub struct ChatServer {
    registry: Registry,
    total_joined: u64,
    requests: u64,
    /// Set once shutdown has run
    closing: bool,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, capacity: usize) -> Self {
        Self {
            registry: Registry::new(capacity),
            total_joined: 0,
            requests: 0,
            closing: false,
            receiver,
        }
    }

    /// Start the actor on its own task and return a handle to it
    pub fn spawn(capacity: usize, buffer: usize) -> (ServerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer);
        let task = tokio::spawn(ChatServer::new(rx, capacity).run());
        (ServerHandle { sender: tx }, task)
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started (capacity {})", self.registry.capacity());

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Join {
                nickname,
                addr,
                local_addr,
                outbox,
                responder,
            } => {
                let result = self.handle_join(nickname, addr, local_addr, outbox);
                // The handler may have given up waiting; nothing to do then
                let _ = responder.send(result);
            }
            ServerCommand::Broadcast { client_id, text } => {
                self.requests += 1;
                self.handle_broadcast(client_id, &text);
            }
            ServerCommand::List { client_id } => {
                self.requests += 1;
                self.handle_list(client_id);
            }
            ServerCommand::Secret {
                client_id,
                receiver,
                text,
            } => {
                self.requests += 1;
                self.handle_secret(client_id, &receiver, &text);
            }
            ServerCommand::Except {
                client_id,
                receiver,
                text,
            } => {
                self.requests += 1;
                self.handle_except(client_id, &receiver, &text);
            }
            ServerCommand::Reply {
                client_id,
                response,
            } => {
                self.requests += 1;
                if let Some(p) = self.registry.get(client_id) {
                    let _ = p.deliver(response);
                }
            }
            ServerCommand::Kick { client_id } => self.handle_kick(client_id),
            ServerCommand::Leave { client_id } => {
                self.remove_participant(client_id);
            }
            ServerCommand::Stats { responder } => {
                let _ = responder.send(self.stats());
            }
            ServerCommand::Shutdown { responder } => {
                let notified = self.handle_shutdown();
                let _ = responder.send(notified);
            }
        }
    }

    /// Handle admission
    fn handle_join(
        &mut self,
        nickname: Nickname,
        addr: SocketAddr,
        local_addr: SocketAddr,
        outbox: Outbox,
    ) -> Result<JoinAck, AppError> {
        if self.closing {
            return Err(AppError::ShuttingDown);
        }
        let client_id = self.registry.try_join(nickname, addr, outbox)?.id;
        let members = self.registry.len();
        self.total_joined += 1;

        if let Some(participant) = self.registry.get(client_id) {
            let welcome = format!(
                "[Welcome {} to the chat room at {}.]\n[There are {} users in the room.]",
                participant.nickname, local_addr, members
            );
            // First message on a fresh queue, cannot be full
            let _ = participant.deliver(Response::reply(welcome));

            info!(
                "[{} joined from {}. There are {} users in the room.]",
                participant.nickname, addr, members
            );
        }

        Ok(JoinAck { client_id, members })
    }

    /// Handle message to everyone else
    fn handle_broadcast(&self, client_id: ClientId, text: &str) {
        let Some(sender) = self.registry.get(client_id) else {
            return;
        };
        let response = Response::message(format!("{}> {}", sender.nickname, text));
        let delivered = router::broadcast(&self.registry, &response, Some(client_id));
        debug!("Broadcast from {} reached {} participants", client_id, delivered);
    }

    /// Handle member listing
    fn handle_list(&self, client_id: ClientId) {
        let Some(requester) = self.registry.get(client_id) else {
            return;
        };
        let listing: String = self
            .registry
            .snapshot()
            .into_iter()
            .map(|(_, nickname, addr)| format!("<{}, {}, {}>\n", nickname, addr.ip(), addr.port()))
            .collect();
        if let Err(e) = requester.deliver(Response::message(listing)) {
            debug!("Listing for {} dropped: {}", client_id, e);
        }
    }

    /// Handle secret message to one participant
    fn handle_secret(&self, client_id: ClientId, receiver: &str, text: &str) {
        let Some(sender) = self.registry.get(client_id) else {
            return;
        };
        let response = Response::message(format!("from: {}> {}", sender.nickname, text));
        if router::directed_send(&self.registry, &response, receiver) == 0 {
            debug!("Secret from {} to '{}' reached nobody", client_id, receiver);
        }
    }

    /// Handle message to everyone but one participant
    fn handle_except(&self, client_id: ClientId, receiver: &str, text: &str) {
        let Some(sender) = self.registry.get(client_id) else {
            return;
        };
        let response = Response::message(format!("{}> {}", sender.nickname, text));
        router::exclusion_send(
            &self.registry,
            &response,
            sender.nickname.as_str(),
            receiver,
        );
    }

    /// Handle moderation removal: the kick notice is the last thing written
    fn handle_kick(&mut self, client_id: ClientId) {
        let Some(participant) = self.remove_participant(client_id) else {
            return;
        };
        info!("Kicked {} ({})", participant.nickname, client_id);
        if let Err(e) = participant.dismiss(Response::error(KICK_NOTICE)) {
            debug!("Kick notice for {} not delivered: {}", client_id, e);
        }
    }

    /// Helper: remove a participant and tell the room
    ///
    /// Removal is keyed by identity and only announced when the
    /// participant was actually present, so repeated triggers for the
    /// same participant collapse into one departure. Dropping the returned
    /// participant closes its mailbox.
    fn remove_participant(&mut self, client_id: ClientId) -> Option<Participant> {
        let Some(participant) = self.registry.remove(client_id) else {
            debug!("{} already removed", client_id);
            return None;
        };

        let msg = format!(
            "[{} left the room. There are {} users now.]",
            participant.nickname,
            self.registry.len()
        );
        info!("{}", msg);
        router::broadcast(&self.registry, &Response::message(msg), Some(client_id));
        Some(participant)
    }

    /// Handle shutdown: release every participant with the closing notice
    fn handle_shutdown(&mut self) -> usize {
        self.closing = true;
        let participants = self.registry.drain();
        let total = participants.len();
        let notified = participants
            .into_iter()
            .filter_map(|p| p.dismiss(Response::terminated(SERVER_CLOSED)).ok())
            .count();
        info!("Shutdown: notified {} of {} participants", notified, total);
        notified
    }

    fn stats(&self) -> ServerStats {
        ServerStats {
            members: self.registry.len(),
            capacity: self.registry.capacity(),
            total_joined: self.total_joined,
            requests: self.requests,
        }
    }
}

/// Cloneable handle for talking to the ChatServer actor
#[derive(Debug, Clone)]
pub struct ServerHandle {
    sender: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    /// Fire-and-forget command
    pub async fn send(&self, cmd: ServerCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }

    /// Ask the actor to admit a participant
    pub async fn join(
        &self,
        nickname: Nickname,
        addr: SocketAddr,
        local_addr: SocketAddr,
        outbox: Outbox,
    ) -> Result<JoinAck, AppError> {
        let (responder, rx) = oneshot::channel();
        self.send(ServerCommand::Join {
            nickname,
            addr,
            local_addr,
            outbox,
            responder,
        })
        .await?;
        rx.await.map_err(|_| AppError::ChannelSend)?
    }

    pub async fn stats(&self) -> Result<ServerStats, AppError> {
        let (responder, rx) = oneshot::channel();
        self.send(ServerCommand::Stats { responder }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Announce shutdown; returns how many participants were notified
    pub async fn shutdown(&self) -> Result<usize, AppError> {
        let (responder, rx) = oneshot::channel();
        self.send(ServerCommand::Shutdown { responder }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::message::ResponseCode;
    use crate::participant::{mailbox, Inbox};

    fn addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn join(
        handle: &ServerHandle,
        name: &str,
    ) -> Result<(JoinAck, Inbox), AppError> {
        let (outbox, mut rx) = mailbox(16);
        let ack = handle
            .join(Nickname::parse(name).unwrap(), addr(), addr(), outbox)
            .await?;
        let welcome = rx.recv().await.unwrap();
        assert_eq!(welcome.code, ResponseCode::Reply);
        Ok((ack, rx))
    }

    #[tokio::test]
    async fn test_welcome_reports_member_count() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let (outbox, mut rx) = mailbox(4);
        let ack = handle
            .join(Nickname::parse("alice").unwrap(), addr(), addr(), outbox)
            .await
            .unwrap();

        assert_eq!(ack.members, 1);
        let welcome = rx.recv().await.unwrap();
        assert!(welcome.message.contains("Welcome alice"));
        assert!(welcome.message.contains("There are 1 users"));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_join_exactly_one_wins() {
        let (handle, _task) = ChatServer::spawn(8, 32);

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let (outbox, rx) = mailbox(4);
                let result = handle
                    .join(Nickname::parse("alice").unwrap(), addr(), addr(), outbox)
                    .await;
                (result, rx)
            }));
        }

        let mut wins = 0;
        let mut dups = 0;
        let mut keep = Vec::new();
        for task in tasks {
            let (result, rx) = task.await.unwrap();
            match result {
                Ok(_) => wins += 1,
                Err(AppError::DuplicateNickname(_)) => dups += 1,
                Err(e) => panic!("unexpected {e}"),
            }
            keep.push(rx);
        }
        assert_eq!((wins, dups), (1, 5));
        assert_eq!(handle.stats().await.unwrap().members, 1);
    }

    #[tokio::test]
    async fn test_concurrent_distinct_joins_get_distinct_ids() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let names = ["alice", "bob", "carol", "dave", "erin", "frank"];

        let mut tasks = Vec::new();
        for name in names {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { join(&handle, name).await }));
        }

        let mut ids = Vec::new();
        let mut keep = Vec::new();
        for task in tasks {
            let (ack, rx) = task.await.unwrap().unwrap();
            ids.push(ack.client_id);
            keep.push(rx);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), names.len());

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.members, names.len());
        assert_eq!(stats.total_joined, names.len() as u64);
    }

    #[tokio::test]
    async fn test_capacity_rejects_extra_join() {
        let (handle, _task) = ChatServer::spawn(2, 32);
        let _a = join(&handle, "alice").await.unwrap();
        let _b = join(&handle, "bob").await.unwrap();

        let err = join(&handle, "carol").await.unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded(2)));
    }

    #[tokio::test]
    async fn test_kick_racing_leave_announces_once() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let (alice, mut alice_rx) = join(&handle, "alice").await.unwrap();
        let (_bob, mut bob_rx) = join(&handle, "bob").await.unwrap();

        let id = alice.client_id;
        handle.send(ServerCommand::Kick { client_id: id }).await.unwrap();
        handle.send(ServerCommand::Leave { client_id: id }).await.unwrap();
        handle.send(ServerCommand::Leave { client_id: id }).await.unwrap();
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.members, 1);

        let kick = alice_rx.recv().await.unwrap();
        assert_eq!(kick.code, ResponseCode::Error);
        assert_eq!(kick.message, KICK_NOTICE);
        // Queue closed once removed
        assert!(alice_rx.recv().await.is_none());

        let left = bob_rx.recv().await.unwrap();
        assert_eq!(left.message, "[alice left the room. There are 1 users now.]");
        assert!(tokio::time::timeout(Duration::from_millis(50), bob_rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_kick_notice_survives_full_queue() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let (outbox, mut rx) = mailbox(2);
        let ack = handle
            .join(Nickname::parse("alice").unwrap(), addr(), addr(), outbox)
            .await
            .unwrap();
        let client_id = ack.client_id;

        // Welcome plus two replies overflow a queue of two
        for text in ["one", "two"] {
            handle
                .send(ServerCommand::Reply {
                    client_id,
                    response: Response::reply(text),
                })
                .await
                .unwrap();
        }
        handle.send(ServerCommand::Kick { client_id }).await.unwrap();
        handle.stats().await.unwrap();

        let mut received = Vec::new();
        while let Some(res) = rx.recv().await {
            received.push((res.code, res.message));
        }
        assert_eq!(received.len(), 3);
        assert!(received[0].1.contains("Welcome alice"));
        assert_eq!(received[1].1, "one");
        assert_eq!(
            received[2],
            (ResponseCode::Error, KICK_NOTICE.to_string())
        );
    }

    #[tokio::test]
    async fn test_no_delivery_after_leave() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let (alice, mut alice_rx) = join(&handle, "alice").await.unwrap();
        let (bob, _bob_rx) = join(&handle, "bob").await.unwrap();

        handle
            .send(ServerCommand::Leave {
                client_id: alice.client_id,
            })
            .await
            .unwrap();
        handle
            .send(ServerCommand::Broadcast {
                client_id: bob.client_id,
                text: "anyone?".into(),
            })
            .await
            .unwrap();
        handle.stats().await.unwrap();

        assert!(alice_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_list_and_secret() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let (alice, mut alice_rx) = join(&handle, "alice").await.unwrap();
        let (_bob, mut bob_rx) = join(&handle, "bob").await.unwrap();

        handle
            .send(ServerCommand::List {
                client_id: alice.client_id,
            })
            .await
            .unwrap();
        let listing = alice_rx.recv().await.unwrap().message;
        assert_eq!(
            listing,
            "<alice, 127.0.0.1, 50000>\n<bob, 127.0.0.1, 50000>\n"
        );

        handle
            .send(ServerCommand::Secret {
                client_id: alice.client_id,
                receiver: "bob".into(),
                text: "hello".into(),
            })
            .await
            .unwrap();
        assert_eq!(bob_rx.recv().await.unwrap().message, "from: alice> hello");
    }

    #[tokio::test]
    async fn test_shutdown_notifies_and_closes_everyone() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let (_a, mut alice_rx) = join(&handle, "alice").await.unwrap();
        let (_b, mut bob_rx) = join(&handle, "bob").await.unwrap();

        assert_eq!(handle.shutdown().await.unwrap(), 2);
        for rx in [&mut alice_rx, &mut bob_rx] {
            let res = rx.recv().await.unwrap();
            assert_eq!(res.code, ResponseCode::Terminated);
            assert!(rx.recv().await.is_none());
        }
        assert_eq!(handle.stats().await.unwrap().members, 0);
    }

    #[tokio::test]
    async fn test_shutdown_notice_survives_full_queue() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        // Welcome alone fills this queue
        let (outbox, mut rx) = mailbox(1);
        handle
            .join(Nickname::parse("alice").unwrap(), addr(), addr(), outbox)
            .await
            .unwrap();

        assert_eq!(handle.shutdown().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap().code, ResponseCode::Reply);
        let last = rx.recv().await.unwrap();
        assert_eq!(last.code, ResponseCode::Terminated);
        assert_eq!(last.message, SERVER_CLOSED);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_join_after_shutdown_is_refused() {
        let (handle, _task) = ChatServer::spawn(8, 32);
        let (_a, _alice_rx) = join(&handle, "alice").await.unwrap();
        handle.shutdown().await.unwrap();

        let err = join(&handle, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::ShuttingDown));
        assert_eq!(handle.stats().await.unwrap().members, 0);
    }
}
