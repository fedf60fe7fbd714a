//! imgate-server – Bibliotheks-Root
//!
//! TCP-Acceptor: jede Verbindung bekommt einen Codec und eine Session,
//! empfangene Nachrichten gehen an den konfigurierten `MessageHandler`.
//! Beim Shutdown werden zuerst alle Verbindungen getrennt, danach wird der
//! Session-Manager geschlossen.

pub mod config;
pub mod handler;

use anyhow::Result;
use config::ServerConfig;
use handler::MessageHandler;
use imgate_protocol::ImProtocol;
use imgate_session::{Manager, Session};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    manager: Manager,
    handler: Arc<dyn MessageHandler>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        let manager = Manager::neu(config.server.name.clone());
        Self {
            config,
            manager,
            handler,
        }
    }

    /// Session-Manager des Servers
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Bindet den TCP-Listener und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.tcp_bind_adresse()).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht registriert werden");
                return;
            }
            tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            let _ = shutdown_tx.send(true);
        });

        self.ausfuehren(listener, shutdown_rx).await
    }

    /// Akzeptiert Verbindungen auf `listener` bis `shutdown_rx` `true` meldet
    pub async fn ausfuehren(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            manager = %self.manager.name(),
            queue = self.config.server.send_queue_groesse,
            "Server gestartet"
        );

        let verbindungen = TaskTracker::new();
        let abbruch = CancellationToken::new();
        let protokoll = ImProtocol::new();

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }

                            let session = Session::neu(
                                protokoll.codec(stream),
                                &self.manager,
                                self.config.server.send_queue_groesse,
                            );
                            tracing::debug!(
                                peer = %peer_addr,
                                session_id = session.id(),
                                "Verbindung akzeptiert"
                            );

                            verbindungen.spawn(verbindung_verarbeiten(
                                session,
                                self.manager.clone(),
                                Arc::clone(&self.handler),
                                peer_addr,
                                self.config.lese_timeout(),
                                abbruch.child_token(),
                            ));
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        drop(listener);

        // Erst alle Verbindungen beenden, auch nicht angemeldete
        abbruch.cancel();
        verbindungen.close();
        verbindungen.wait().await;

        self.manager.close().await;

        tracing::info!("Server gestoppt");
        Ok(())
    }
}

/// Empfangs-Schleife einer Verbindung
async fn verbindung_verarbeiten(
    session: Arc<Session>,
    manager: Manager,
    handler: Arc<dyn MessageHandler>,
    peer: SocketAddr,
    lese_timeout: Option<Duration>,
    abbruch: CancellationToken,
) {
    loop {
        if let Some(timeout) = lese_timeout {
            session.set_read_deadline(Some(Instant::now() + timeout));
        }

        let ergebnis = tokio::select! {
            biased;
            _ = abbruch.cancelled() => {
                tracing::debug!(peer = %peer, session_id = session.id(), "Verbindung wird beim Shutdown getrennt");
                break;
            }
            ergebnis = session.receive() => ergebnis,
        };

        match ergebnis {
            Ok(nachricht) => {
                tracing::trace!(session_id = session.id(), nachricht = %nachricht, "Nachricht empfangen");
                handler.verarbeiten(&session, &manager, nachricht).await;
            }
            Err(e) => {
                if session.is_closed() {
                    tracing::debug!(peer = %peer, session_id = session.id(), "Session geschlossen");
                } else {
                    tracing::info!(
                        peer = %peer,
                        session_id = session.id(),
                        fehler = %e,
                        "Verbindung beendet"
                    );
                }
                break;
            }
        }
    }

    // Bereits geschlossen ist hier kein Fehler
    let _ = session.close().await;
}
