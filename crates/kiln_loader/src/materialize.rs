//! Single-flight materialization of owned units.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use kiln_common::UnitName;
use tracing::debug;

use crate::error::MaterializeError;
use crate::pipeline::RewritePipeline;
use crate::store::UnitStore;

/// The shared result of materializing one unit name.
pub type Outcome = Result<Arc<[u8]>, MaterializeError>;

/// Coordinates fetch → rewrite → finalize so it runs at most once per name.
///
/// Each name gets a single-assignment cell, published with a putIfAbsent on
/// the in-flight map: the first publisher's cell is kept and racing
/// publishers await it instead. Inside the cell, one caller runs the
/// computation while concurrent callers for the same name block until it
/// resolves; callers for other names proceed fully in parallel.
///
/// Cells are never removed. A unit's bytes must not change after first
/// resolution, and a failure is equally terminal: retrying with the same
/// immutable input cannot succeed where it didn't before, so repeated
/// requests for a failed name return the memoized error without re-running
/// the expensive path.
pub struct Materializer {
    store: Arc<UnitStore>,
    pipeline: Arc<RewritePipeline>,
    inflight: DashMap<UnitName, Arc<OnceLock<Outcome>>>,
}

impl Materializer {
    /// Creates a coordinator over the given store and pipeline.
    pub fn new(store: Arc<UnitStore>, pipeline: Arc<RewritePipeline>) -> Self {
        Self {
            store,
            pipeline,
            inflight: DashMap::new(),
        }
    }

    /// Materializes a unit, joining any computation already in flight.
    ///
    /// All callers for the same name observe the single outcome — the same
    /// bytes or the identical error. A hung rewrite pass blocks all waiters
    /// for that name indefinitely; unrelated names are unaffected.
    pub fn materialize(&self, name: &UnitName) -> Outcome {
        // Resolved names answer from the memoized cell without touching the
        // entry API's write path.
        if let Some(cell) = self.inflight.get(name) {
            if let Some(outcome) = cell.get() {
                return outcome.clone();
            }
        }

        let cell = self.inflight.entry(name.clone()).or_default().clone();
        // The shard guard is dropped before computing so a slow unit does
        // not stall lookups of unrelated names.
        cell.get_or_init(|| self.run(name)).clone()
    }

    /// Returns the memoized outcome for a name, if it has resolved.
    pub fn completed(&self, name: &UnitName) -> Option<Outcome> {
        self.inflight.get(name).and_then(|cell| cell.get().cloned())
    }

    fn run(&self, name: &UnitName) -> Outcome {
        debug!(unit = %name, "materializing unit");
        let raw = self
            .store
            .raw_bytes_for(name)?
            .ok_or_else(|| MaterializeError::Missing { unit: name.clone() })?;
        let bytes = self.pipeline.apply(name, &raw.bytes)?;
        debug!(unit = %name, size = bytes.len(), "unit materialized");
        Ok(bytes.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RewritePass;
    use kiln_cache::DigestStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowFailingPass {
        runs: AtomicUsize,
    }

    impl RewritePass for SlowFailingPass {
        fn name(&self) -> &str {
            "slow-failing"
        }

        fn rewrite(
            &self,
            _unit: &UnitName,
            _bytes: Vec<u8>,
        ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Err("pass blew up".into())
        }
    }

    struct CountingPass {
        runs: AtomicUsize,
    }

    impl RewritePass for CountingPass {
        fn name(&self) -> &str {
            "counting"
        }

        fn rewrite(
            &self,
            _unit: &UnitName,
            mut bytes: Vec<u8>,
        ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            // Give racing callers a window to pile up on the cell.
            std::thread::sleep(Duration::from_millis(20));
            bytes.push(0xAA);
            Ok(bytes)
        }
    }

    fn make_parts(dir: &tempfile::TempDir) -> (Arc<UnitStore>, Arc<RewritePipeline>) {
        let store = Arc::new(UnitStore::new(&[], "unit"));
        let pipeline = Arc::new(RewritePipeline::new(DigestStore::new(
            &dir.path().join("cache"),
        )));
        (store, pipeline)
    }

    #[test]
    fn materializes_synthesized_unit() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = make_parts(&dir);
        let name = UnitName::new("pkg.A");
        store.insert_synthesized(name.clone(), Arc::from(&b"raw"[..]));

        let coordinator = Materializer::new(store, pipeline);
        let bytes = coordinator.materialize(&name).unwrap();
        assert_eq!(&bytes[..], b"raw");
    }

    #[test]
    fn unknown_owned_unit_is_missing_error() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = make_parts(&dir);
        let coordinator = Materializer::new(store, pipeline);

        let err = coordinator.materialize(&UnitName::new("pkg.Ghost")).unwrap_err();
        assert!(matches!(err, MaterializeError::Missing { .. }));
    }

    #[test]
    fn concurrent_requests_run_pass_once() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = make_parts(&dir);
        let name = UnitName::new("pkg.Hot");
        store.insert_synthesized(name.clone(), Arc::from(&[0x10u8, 0x20][..]));

        let pass = Arc::new(CountingPass {
            runs: AtomicUsize::new(0),
        });
        pipeline.register(name.clone(), pass.clone());

        let coordinator = Materializer::new(store, pipeline);
        let outcomes: Vec<Outcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| coordinator.materialize(&name)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(pass.runs.load(Ordering::SeqCst), 1);
        let expected: &[u8] = &[0x10, 0x20, 0xAA];
        for outcome in outcomes {
            assert_eq!(&outcome.unwrap()[..], expected);
        }
    }

    #[test]
    fn concurrent_failure_is_shared_and_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = make_parts(&dir);
        let name = UnitName::new("pkg.C");
        store.insert_synthesized(name.clone(), Arc::from(&b"raw"[..]));

        let pass = Arc::new(SlowFailingPass {
            runs: AtomicUsize::new(0),
        });
        pipeline.register(name.clone(), pass.clone());

        let coordinator = Materializer::new(store, pipeline);
        let (first, second) = std::thread::scope(|s| {
            let a = s.spawn(|| coordinator.materialize(&name));
            let b = s.spawn(|| coordinator.materialize(&name));
            (a.join().unwrap(), b.join().unwrap())
        });

        assert_eq!(pass.runs.load(Ordering::SeqCst), 1, "pass must execute exactly once");
        let first_err = first.unwrap_err();
        let second_err = second.unwrap_err();
        assert_eq!(first_err.to_string(), second_err.to_string());
        assert!(first_err.to_string().contains("pass blew up"));

        // Later requests get the memoized failure without another attempt.
        assert!(coordinator.materialize(&name).is_err());
        assert_eq!(pass.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn io_failure_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let unit_file = root.join("pkg/A.unit");
        std::fs::create_dir_all(unit_file.parent().unwrap()).unwrap();
        std::fs::write(&unit_file, b"bytes").unwrap();

        let store = Arc::new(UnitStore::new(&[root], "unit"));
        let pipeline = Arc::new(RewritePipeline::new(DigestStore::new(
            &dir.path().join("cache"),
        )));
        let coordinator = Materializer::new(store, pipeline);

        let name = UnitName::new("pkg.A");
        std::fs::remove_file(&unit_file).unwrap();
        let err = coordinator.materialize(&name).unwrap_err();
        assert!(matches!(err, MaterializeError::Io { .. }));

        // Restoring the file does not reopen the name: failure is terminal
        // for the coordinator's lifetime.
        std::fs::write(&unit_file, b"bytes").unwrap();
        assert!(coordinator.materialize(&name).is_err());
    }

    #[test]
    fn distinct_names_materialize_independently() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = make_parts(&dir);
        let a = UnitName::new("pkg.A");
        let b = UnitName::new("pkg.B");
        store.insert_synthesized(a.clone(), Arc::from(&b"aaa"[..]));
        store.insert_synthesized(b.clone(), Arc::from(&b"bbb"[..]));

        let coordinator = Materializer::new(store, pipeline);
        std::thread::scope(|s| {
            let ha = s.spawn(|| coordinator.materialize(&a));
            let hb = s.spawn(|| coordinator.materialize(&b));
            assert_eq!(&ha.join().unwrap().unwrap()[..], b"aaa");
            assert_eq!(&hb.join().unwrap().unwrap()[..], b"bbb");
        });
    }

    #[test]
    fn completed_reports_resolved_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let (store, pipeline) = make_parts(&dir);
        let name = UnitName::new("pkg.A");
        store.insert_synthesized(name.clone(), Arc::from(&b"raw"[..]));

        let coordinator = Materializer::new(store, pipeline);
        assert!(coordinator.completed(&name).is_none());
        coordinator.materialize(&name).unwrap();
        assert!(coordinator.completed(&name).unwrap().is_ok());
    }
}
