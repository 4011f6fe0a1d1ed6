use conductor_types::LogLevel;
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::{process_manager::BoxStream, registry::RegistryEvent};

/// Forward every line of a process stream to registry subscribers.
///
/// Lines are traced at debug only; subscribers own the user-facing rendering.
pub(crate) async fn follow_output(
    mut output: BoxStream<String>,
    service: String,
    events: broadcast::Sender<RegistryEvent>,
) {
    while let Some(line) = output.next().await {
        let level = LogLevel::from_line(&line);
        tracing::debug!(service = %service, level = ?level, "{line}");

        // No subscribers is fine.
        let _ = events.send(RegistryEvent::Log {
            service: service.clone(),
            level,
            message: line,
        });
    }
    tracing::debug!(service = %service, "Output stream closed");
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[tokio::test]
    async fn test_lines_are_classified() {
        let (tx, mut rx) = broadcast::channel(8);
        let lines = futures::stream::iter(vec![
            "INFO: ready".to_owned(),
            "Traceback".to_owned(),
        ]);

        follow_output(Box::pin(lines), "svc".to_owned(), tx).await;

        let mut levels = Vec::new();
        while let Ok(RegistryEvent::Log { level, .. }) = rx.try_recv() {
            levels.push(level);
        }
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Error]);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lines_stay_out_of_info_logs() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer({
                let captured = captured.clone();
                move || captured.clone()
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (tx, mut rx) = broadcast::channel(8);
        let lines = futures::stream::iter(vec!["ERROR: disk full".to_owned()]);
        follow_output(Box::pin(lines), "svc".to_owned(), tx).await;

        assert!(matches!(rx.try_recv(), Ok(RegistryEvent::Log { .. })));
        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(!logged.contains("disk full"), "{logged}");
    }
}
