//! Preview orchestration
//!
//! Coordinates one logical preview request: cache lookup, fetch, parse,
//! render, cache store. Requests for the same cache key are single-flight:
//! a process-wide in-flight map hands concurrent callers the leader's
//! result instead of starting duplicate renders.

use crate::cache::{CacheStore, PreviewCache};
use crate::key::CacheKey;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use stlview_core::{Geometry, PreviewOptions, Result};
use stlview_io::{self as io, ByteSource};
use stlview_render::StillRenderer;

/// Renders a framed geometry into encoded still-image bytes.
///
/// Abstracted so the orchestrator is testable without a GPU.
pub trait PreviewRenderer: Send + Sync {
    fn render_preview(&self, geometry: &mut Geometry, options: &PreviewOptions) -> Result<Vec<u8>>;
}

impl PreviewRenderer for StillRenderer {
    fn render_preview(&self, geometry: &mut Geometry, options: &PreviewOptions) -> Result<Vec<u8>> {
        self.render(geometry, options)
    }
}

/// One in-flight render shared by its leader and any coalesced followers
struct Flight {
    result: Mutex<Option<Result<Vec<u8>>>>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn publish(&self, result: Result<Vec<u8>>) {
        *self.result.lock().unwrap() = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> Result<Vec<u8>> {
        let mut slot = self.result.lock().unwrap();
        while slot.is_none() {
            slot = self.done.wait(slot).unwrap();
        }
        slot.as_ref().unwrap().clone()
    }
}

/// Coordinates cache, byte source and renderer for preview requests
pub struct PreviewOrchestrator<S: CacheStore, B: ByteSource, R: PreviewRenderer> {
    cache: PreviewCache<S>,
    source: B,
    renderer: R,
    in_flight: Mutex<HashMap<CacheKey, Arc<Flight>>>,
}

impl<S: CacheStore, B: ByteSource, R: PreviewRenderer> PreviewOrchestrator<S, B, R> {
    pub fn new(cache: PreviewCache<S>, source: B, renderer: R) -> Self {
        Self {
            cache,
            source,
            renderer,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Produce the preview image for a source reference.
    ///
    /// Returns cached bytes when fresh; otherwise fetches, parses and
    /// renders, storing the result on success. Failures are surfaced as
    /// typed errors and never cached, so an explicit retry through this
    /// same entry point is always possible.
    pub fn request_preview(
        &self,
        source_ref: &str,
        caller_id: Option<&str>,
        options: &PreviewOptions,
    ) -> Result<Vec<u8>> {
        let key = CacheKey::derive(source_ref, caller_id, options);

        if let Some(image) = self.cache.get(&key) {
            log::debug!("preview cache hit for {key}");
            return Ok(image);
        }

        let (flight, is_leader) = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(&key) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight::new());
                    in_flight.insert(key.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !is_leader {
            log::debug!("coalescing preview request for {key}");
            return flight.wait();
        }

        let result = self.generate(source_ref, options);
        if let Ok(image) = &result {
            self.cache.put(&key, image);
        }
        self.in_flight.lock().unwrap().remove(&key);
        flight.publish(result.clone());
        result
    }

    /// Cache miss path: fetch, parse, render
    fn generate(&self, source_ref: &str, options: &PreviewOptions) -> Result<Vec<u8>> {
        let raw = self.source.fetch_bytes(source_ref)?;
        let mut geometry = io::parse(&raw)?;
        let image = self.renderer.render_preview(&mut geometry, options);
        // The geometry exists solely for this render; release its buffers
        // before surfacing the result.
        geometry.clear();
        image
    }

    /// Access the underlying cache, e.g. for explicit clears
    pub fn cache(&self) -> &PreviewCache<S> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use stlview_core::{Error, Point3f, Vector3f};
    use stlview_io::MemorySource;

    /// Deterministic fake renderer that counts invocations
    struct CountingRenderer {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingRenderer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PreviewRenderer for CountingRenderer {
        fn render_preview(
            &self,
            geometry: &mut Geometry,
            _options: &PreviewOptions,
        ) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.fail {
                return Err(Error::Encode("surface not ready".to_string()));
            }
            Ok(vec![geometry.triangle_count() as u8; 16])
        }
    }

    fn one_facet_stl() -> Vec<u8> {
        let mut g = Geometry::new();
        g.push_facet(
            [
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            Vector3f::new(0.0, 0.0, 1.0),
        );
        stlview_io::encode_binary(&g)
    }

    fn source_with(reference: &str) -> MemorySource {
        let mut source = MemorySource::new();
        source.insert(reference, one_facet_stl());
        source
    }

    fn orchestrator(
        renderer: CountingRenderer,
    ) -> PreviewOrchestrator<MemoryStore, MemorySource, CountingRenderer> {
        PreviewOrchestrator::new(
            PreviewCache::new(MemoryStore::new()),
            source_with("cube.stl"),
            renderer,
        )
    }

    #[test]
    fn second_request_is_served_from_cache() {
        let orch = orchestrator(CountingRenderer::new());
        let options = PreviewOptions::default();
        let first = orch.request_preview("cube.stl", None, &options).unwrap();
        let second = orch.request_preview("cube.stl", None, &options).unwrap();
        assert_eq!(first, second);
        assert_eq!(orch.renderer.calls(), 1);
    }

    #[test]
    fn differing_options_render_separately() {
        let orch = orchestrator(CountingRenderer::new());
        let a = PreviewOptions::default();
        let mut b = PreviewOptions::default();
        b.model_color = [255, 0, 0];
        orch.request_preview("cube.stl", None, &a).unwrap();
        orch.request_preview("cube.stl", None, &b).unwrap();
        assert_eq!(orch.renderer.calls(), 2);
    }

    #[test]
    fn failures_are_surfaced_and_never_cached() {
        let orch = orchestrator(CountingRenderer::failing());
        let options = PreviewOptions::default();
        let err = orch.request_preview("cube.stl", None, &options).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
        assert!(err.is_retryable());
        assert_eq!(orch.cache().size_of(|_| true), 0);

        // The retry entry point is the same call, and it renders again.
        let err = orch.request_preview("cube.stl", None, &options).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
        assert_eq!(orch.renderer.calls(), 2);
    }

    #[test]
    fn unknown_sources_are_fetch_errors() {
        let orch = orchestrator(CountingRenderer::new());
        let err = orch
            .request_preview("missing.stl", None, &PreviewOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert_eq!(orch.renderer.calls(), 0);
    }

    #[test]
    fn concurrent_identical_requests_share_one_render() {
        let orch = Arc::new(orchestrator(CountingRenderer::slow(Duration::from_millis(
            150,
        ))));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let orch = Arc::clone(&orch);
            handles.push(std::thread::spawn(move || {
                orch.request_preview("cube.stl", None, &PreviewOptions::default())
            }));
        }
        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
        // All four callers observed a single render.
        assert_eq!(orch.renderer.calls(), 1);
    }
}
