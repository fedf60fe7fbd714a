//! Nachrichten-Verarbeitung
//!
//! Der Acceptor reicht jede empfangene Nachricht an einen `MessageHandler`
//! weiter. `LoginHandler` ist die mitgelieferte Standard-Implementierung:
//!
//! - `cmd == CMD_LOGIN`: Body ist der Token (UTF-8), die Session wird damit
//!   im Manager registriert und erhaelt ihre Identitaet als Antwort
//! - jedes andere Kommando vor dem Login wird mit `STATUS_FEHLER` beantwortet
//! - nach dem Login wird die Nachricht an alle Sessions desselben Tokens
//!   verteilt (inklusive der sendenden Session)

use async_trait::async_trait;
use imgate_protocol::Message;
use imgate_session::{Manager, Session};
use std::sync::Arc;

/// Kommando fuer die Anmeldung
pub const CMD_LOGIN: u16 = 1;
/// Status einer erfolgreichen Antwort
pub const STATUS_OK: u8 = 0;
/// Status einer abgelehnten Anfrage
pub const STATUS_FEHLER: u8 = 1;

// ---------------------------------------------------------------------------
// MessageHandler
// ---------------------------------------------------------------------------

/// Verarbeitet die Nachrichten einer Session
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Wird fuer jede empfangene Nachricht aufgerufen
    async fn verarbeiten(&self, session: &Arc<Session>, manager: &Manager, nachricht: Message);
}

// ---------------------------------------------------------------------------
// LoginHandler
// ---------------------------------------------------------------------------

/// Login per Token, danach Verteilung an alle Geraete desselben Tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct LoginHandler;

impl LoginHandler {
    pub fn new() -> Self {
        Self
    }

    async fn login(&self, session: &Arc<Session>, manager: &Manager, nachricht: &Message) {
        if !session.token().is_empty() {
            antworten(session, nachricht.antwort(STATUS_FEHLER, "bereits angemeldet")).await;
            return;
        }

        let token = match std::str::from_utf8(&nachricht.body) {
            Ok(t) => t.trim().to_string(),
            Err(_) => {
                antworten(session, nachricht.antwort(STATUS_FEHLER, "token kein utf-8")).await;
                return;
            }
        };

        session.set_token(token);
        let ergebnis = session
            .identity()
            .and_then(|identity| manager.add_session(session).map(|()| identity));

        match ergebnis {
            Ok(identity) => {
                tracing::info!(identity = %identity, "Session angemeldet");
                antworten(session, nachricht.antwort(STATUS_OK, identity.to_string())).await;
            }
            Err(e) => {
                tracing::debug!(session_id = session.id(), fehler = %e, "Login abgelehnt");
                // Token zuruecksetzen, damit ein neuer Versuch moeglich bleibt
                session.set_token(String::new());
                antworten(session, nachricht.antwort(STATUS_FEHLER, e.to_string())).await;
            }
        }
    }
}

#[async_trait]
impl MessageHandler for LoginHandler {
    async fn verarbeiten(&self, session: &Arc<Session>, manager: &Manager, nachricht: Message) {
        if nachricht.header.cmd == CMD_LOGIN {
            self.login(session, manager, &nachricht).await;
            return;
        }

        let token = session.token();
        if token.is_empty() {
            antworten(session, nachricht.antwort(STATUS_FEHLER, "nicht angemeldet")).await;
            return;
        }

        for ziel in manager.get_token_sessions(&token) {
            if let Err(e) = ziel.send(nachricht.clone()).await {
                tracing::debug!(
                    ziel = ziel.id(),
                    fehler = %e,
                    "Zustellung an Session fehlgeschlagen"
                );
            }
        }
    }
}

async fn antworten(session: &Session, antwort: Message) {
    if let Err(e) = session.send(antwort).await {
        tracing::debug!(session_id = session.id(), fehler = %e, "Antwort nicht zustellbar");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use imgate_protocol::{Codec, Header, ImProtocol, StreamCodec};
    use tokio::io::DuplexStream;

    fn session_paar(manager: &Manager) -> (Arc<Session>, StreamCodec<DuplexStream>) {
        let (server, client) = tokio::io::duplex(64 * 1024);
        let codec = ImProtocol::new().codec(server);
        (Session::neu(codec, manager, 0), StreamCodec::new(client))
    }

    fn nachricht(cmd: u16, body: &'static [u8]) -> Message {
        Message::neu(
            Header {
                cmd,
                seq: 9,
                ..Header::default()
            },
            body,
        )
    }

    #[tokio::test]
    async fn login_registriert_session() {
        let manager = Manager::neu("gate");
        let (session, client) = session_paar(&manager);
        let handler = LoginHandler::new();

        handler
            .verarbeiten(&session, &manager, nachricht(CMD_LOGIN, b"u1"))
            .await;

        let antwort = client.receive().await.unwrap();
        assert_eq!(antwort.header.status, STATUS_OK);
        assert_eq!(antwort.header.seq, 9);
        assert_eq!(
            antwort.body.as_ref(),
            format!("gate:u1:{}", session.id()).as_bytes()
        );
        assert_eq!(manager.get_token_sessions("u1").len(), 1);
    }

    #[tokio::test]
    async fn nachricht_vor_login_wird_abgelehnt() {
        let manager = Manager::neu("gate");
        let (session, client) = session_paar(&manager);

        LoginHandler::new()
            .verarbeiten(&session, &manager, nachricht(5, b"hallo"))
            .await;

        let antwort = client.receive().await.unwrap();
        assert_eq!(antwort.header.status, STATUS_FEHLER);
        assert_eq!(antwort.header.cmd, 5);
        assert_eq!(manager.session_anzahl(), 0);
    }

    #[tokio::test]
    async fn leerer_token_wird_abgelehnt() {
        let manager = Manager::neu("gate");
        let (session, client) = session_paar(&manager);

        LoginHandler::new()
            .verarbeiten(&session, &manager, nachricht(CMD_LOGIN, b"  "))
            .await;

        let antwort = client.receive().await.unwrap();
        assert_eq!(antwort.header.status, STATUS_FEHLER);
        assert!(session.token().is_empty());
        assert_eq!(manager.session_anzahl(), 0);
    }

    #[tokio::test]
    async fn zweiter_login_wird_abgelehnt() {
        let manager = Manager::neu("gate");
        let (session, client) = session_paar(&manager);
        let handler = LoginHandler::new();

        handler
            .verarbeiten(&session, &manager, nachricht(CMD_LOGIN, b"u1"))
            .await;
        handler
            .verarbeiten(&session, &manager, nachricht(CMD_LOGIN, b"u2"))
            .await;

        assert_eq!(client.receive().await.unwrap().header.status, STATUS_OK);
        assert_eq!(client.receive().await.unwrap().header.status, STATUS_FEHLER);
        assert_eq!(session.token(), "u1");
    }

    #[tokio::test]
    async fn verteilung_an_alle_geraete_des_tokens() {
        let manager = Manager::neu("gate");
        let (a, client_a) = session_paar(&manager);
        let (b, client_b) = session_paar(&manager);
        let (c, client_c) = session_paar(&manager);
        let handler = LoginHandler::new();

        handler.verarbeiten(&a, &manager, nachricht(CMD_LOGIN, b"u1")).await;
        handler.verarbeiten(&b, &manager, nachricht(CMD_LOGIN, b"u1")).await;
        handler.verarbeiten(&c, &manager, nachricht(CMD_LOGIN, b"u2")).await;
        for client in [&client_a, &client_b, &client_c] {
            assert_eq!(client.receive().await.unwrap().header.status, STATUS_OK);
        }

        handler.verarbeiten(&a, &manager, nachricht(5, b"hallo")).await;

        for client in [&client_a, &client_b] {
            let m = client.receive().await.unwrap();
            assert_eq!(m.header.cmd, 5);
            assert_eq!(m.body.as_ref(), b"hallo");
        }

        // u2 bekommt nichts
        client_c.set_read_deadline(Some(
            tokio::time::Instant::now() + std::time::Duration::from_millis(50),
        ));
        let err = client_c.receive().await.unwrap_err();
        assert!(err.ist_zeitlimit());
    }
}
