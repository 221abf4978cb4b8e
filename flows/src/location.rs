//! Device location handling: normalization, plausibility, and the watch
//! subscription.

use chrono::{DateTime, Utc};
use domain::{plausible_fix, round6, GeoFix};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied. Allow location access and try again.")]
    PermissionDenied,
    #[error("Could not determine your position. Move somewhere with a clearer view of the sky.")]
    Unavailable,
    #[error("Timed out waiting for a position fix. Try again.")]
    Timeout,
    #[error("Received an implausible position fix; it was discarded.")]
    Implausible,
    #[error("This device has no location capability.")]
    Unsupported,
}

/// A raw sample as delivered by the device, before normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// Seam to the platform's location machinery. Yields fixes (or errors) until
/// it returns `None`; implementations must stop producing once the watch
/// handle is gone.
pub trait FixSource {
    fn next_fix(
        &mut self,
    ) -> impl std::future::Future<Output = Option<Result<RawFix, LocationError>>> + Send;
}

/// Latest-sample-wins store for position readings.
#[derive(Debug, Default)]
pub struct LocationReader {
    latest: Option<GeoFix>,
    error: Option<LocationError>,
}

impl LocationReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and store one sample. Implausible-precision fixes set an
    /// error instead of updating state; a later good fix clears it.
    pub fn ingest(&mut self, sample: Result<RawFix, LocationError>, now: DateTime<Utc>) {
        match sample {
            Ok(raw) => {
                if !plausible_fix(raw.latitude, raw.longitude) {
                    self.error = Some(LocationError::Implausible);
                    return;
                }
                self.latest = Some(GeoFix {
                    latitude: round6(raw.latitude),
                    longitude: round6(raw.longitude),
                    accuracy: raw.accuracy,
                    timestamp: now,
                });
                self.error = None;
            }
            Err(e) => {
                debug!("location error: {e}");
                self.error = Some(e);
            }
        }
    }

    pub fn latest(&self) -> Option<&GeoFix> {
        self.latest.as_ref()
    }

    pub fn error(&self) -> Option<&LocationError> {
        self.error.as_ref()
    }

    /// Manual coordinate entry bypasses the device but not the checks.
    pub fn set_manual(&mut self, latitude: f64, longitude: f64, now: DateTime<Utc>) {
        self.ingest(
            Ok(RawFix {
                latitude,
                longitude,
                accuracy: 0.0,
            }),
            now,
        );
    }
}

/// A running subscription to a fix source. The producer task stops as soon as
/// this handle is dropped, so nothing leaks past the owning view.
pub struct LocationWatch {
    rx: mpsc::UnboundedReceiver<Result<RawFix, LocationError>>,
    reader: LocationReader,
}

impl LocationWatch {
    pub fn spawn<S>(handle: &tokio::runtime::Handle, mut source: S) -> Self
    where
        S: FixSource + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(async move {
            while let Some(sample) = source.next_fix().await {
                if tx.send(sample).is_err() {
                    break;
                }
            }
        });
        Self {
            rx,
            reader: LocationReader::new(),
        }
    }

    /// Drain any samples delivered since the last call into the reader.
    pub fn pump(&mut self, now: DateTime<Utc>) {
        while let Ok(sample) = self.rx.try_recv() {
            self.reader.ingest(sample, now);
        }
    }

    pub fn reader(&self) -> &LocationReader {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut LocationReader {
        &mut self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn good_fix_is_rounded_and_stored() {
        let mut reader = LocationReader::new();
        reader.ingest(
            Ok(RawFix {
                latitude: 12.3456789,
                longitude: 77.5945678,
                accuracy: 8.0,
            }),
            now(),
        );
        let fix = reader.latest().expect("fix stored");
        assert_eq!(fix.latitude, 12.345679);
        assert_eq!(fix.longitude, 77.594568);
        assert!(reader.error().is_none());
    }

    #[test]
    fn implausible_fix_sets_error_and_keeps_state() {
        let mut reader = LocationReader::new();
        reader.set_manual(12.971599, 77.594566, now());
        reader.ingest(
            Ok(RawFix {
                latitude: 12.345678901234,
                longitude: 77.5,
                accuracy: 5.0,
            }),
            now(),
        );
        assert_eq!(reader.error(), Some(&LocationError::Implausible));
        // previous good fix is untouched
        assert_eq!(reader.latest().map(|f| f.latitude), Some(12.971599));
    }

    #[test]
    fn newer_fix_replaces_older() {
        let mut reader = LocationReader::new();
        reader.set_manual(10.0, 20.0, now());
        reader.set_manual(11.0, 21.0, now());
        assert_eq!(reader.latest().map(|f| f.latitude), Some(11.0));
    }

    #[test]
    fn error_kinds_have_distinct_messages() {
        let msgs = [
            LocationError::PermissionDenied.to_string(),
            LocationError::Unavailable.to_string(),
            LocationError::Timeout.to_string(),
            LocationError::Implausible.to_string(),
        ];
        for (i, a) in msgs.iter().enumerate() {
            for b in &msgs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    struct ScriptedSource {
        samples: Vec<Result<RawFix, LocationError>>,
    }

    impl FixSource for ScriptedSource {
        fn next_fix(
            &mut self,
        ) -> impl std::future::Future<Output = Option<Result<RawFix, LocationError>>> + Send
        {
            let sample = if self.samples.is_empty() {
                None
            } else {
                Some(self.samples.remove(0))
            };
            async move { sample }
        }
    }

    #[tokio::test]
    async fn watch_pumps_samples_into_reader() {
        let source = ScriptedSource {
            samples: vec![
                Ok(RawFix {
                    latitude: 12.9715987,
                    longitude: 77.5945627,
                    accuracy: 10.0,
                }),
                Err(LocationError::Timeout),
            ],
        };
        let mut watch = LocationWatch::spawn(&tokio::runtime::Handle::current(), source);
        // give the producer task a chance to run
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        watch.pump(now());
        assert_eq!(watch.reader().error(), Some(&LocationError::Timeout));
        assert_eq!(watch.reader().latest().map(|f| f.latitude), Some(12.971599));
    }
}
