#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;

use nexsy_db::Database;
use nexsy_gateway::{ConnectionId, Hub};
use nexsy_types::events::{ClientEvent, ServerEvent, UserRef};

pub struct Client {
    pub conn: ConnectionId,
    pub rx: UnboundedReceiver<ServerEvent>,
}

impl Client {
    /// Everything queued for this connection so far.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            out.push(ev);
        }
        out
    }

    /// Queued events with the given wire name, discarding the rest.
    pub fn take(&mut self, name: &str) -> Vec<ServerEvent> {
        self.drain().into_iter().filter(|ev| ev.name() == name).collect()
    }
}

pub fn setup(users: &[&str]) -> (Hub, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    for user in users {
        db.create_user(user, None, "not-a-real-hash", Utc::now()).unwrap();
    }
    (Hub::new(db.clone()), db)
}

pub fn connect(hub: &Hub) -> Client {
    let (conn, rx) = hub.connect();
    Client { conn, rx }
}

/// Connect, register as `username`, and clear the presence chatter.
pub async fn login(hub: &Hub, username: &str) -> Client {
    let mut client = connect(hub);
    hub.handle(
        client.conn,
        ClientEvent::RegisterUser(UserRef {
            username: username.to_string(),
        }),
    )
    .await;
    client.drain();
    client
}
