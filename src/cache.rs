// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Memoization of rendered wave shapes.
//!
//! Summing hundreds of harmonics for a low note is expensive, so every distinct request
//! is rendered once at unit amplitude and rescaled for later requests of any amplitude.
//! Entries are never evicted: the working set is bounded by the distinct notes played.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use syntone_core::nonnan::F64N;

use crate::oscillator::WaveShape;
use crate::wave::SampleFormat;

/// A rendered wave at unit amplitude, shared between the cache and its readers.
pub type CachedShape = Arc<[f64]>;

/// Everything that determines the samples of a rendered wave.
///
/// Frequency and duration are compared by exact value. Two requests whose
/// frequencies differ only by rounding noise are different cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaveRequest {
    shape: WaveShape,
    frequency: F64N,
    duration: F64N,
    format: SampleFormat,
}

impl WaveRequest {
    /// Returns `None` if the frequency or the duration is NaN.
    pub fn new(shape: WaveShape, frequency: f64, duration: f64, format: SampleFormat) -> Option<Self> {
        Some(Self {
            shape,
            frequency: F64N::new(frequency)?,
            duration: F64N::new(duration)?,
            format,
        })
    }
}

/// Insert-only map from requests to their unit-amplitude shapes.
#[derive(Debug, Default)]
pub struct WaveCache {
    shapes: Mutex<HashMap<WaveRequest, CachedShape>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl WaveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries are only ever added, so a map left behind by a panicking writer is still consistent.
    fn shapes(&self) -> MutexGuard<'_, HashMap<WaveRequest, CachedShape>> {
        self.shapes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, request: &WaveRequest) -> Option<CachedShape> {
        self.shapes().get(request).cloned()
    }

    /// Store a shape unless the request already has one. Returns the shape that is in the cache afterwards.
    pub fn store(&self, request: WaveRequest, shape: CachedShape) -> CachedShape {
        Arc::clone(self.shapes().entry(request).or_insert(shape))
    }

    /// Return the cached shape for `request`, rendering it with `render` on a miss.
    ///
    /// The lock is held while rendering, so concurrent callers asking for the
    /// same request wait for the first one instead of rendering it twice.
    pub fn get_or_insert_with<F: FnOnce() -> Vec<f64>>(&self, request: WaveRequest, render: F) -> CachedShape {
        let mut shapes = self.shapes();
        if let Some(shape) = shapes.get(&request) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit for {:?}", request);
            return Arc::clone(shape);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("cache miss for {:?}, rendering", request);
        let shape: CachedShape = render().into();
        shapes.insert(request, Arc::clone(&shape));
        shape
    }

    /// Number of distinct requests in the cache.
    pub fn len(&self) -> usize {
        self.shapes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of [`get_or_insert_with`](Self::get_or_insert_with) calls answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of [`get_or_insert_with`](Self::get_or_insert_with) calls that had to render.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::oscillator::Synth;
    use std::thread;

    fn request(frequency: f64) -> WaveRequest {
        WaveRequest::new(WaveShape::Sine, frequency, 1.0, SampleFormat::F32).unwrap()
    }

    #[test]
    fn renders_once() {
        let cache = WaveCache::new();
        let mut renders = 0;
        let first = cache.get_or_insert_with(request(440.0), || {
            renders += 1;
            vec![0.0, 1.0]
        });
        let second = cache.get_or_insert_with(request(440.0), || {
            renders += 1;
            vec![5.0]
        });
        assert_eq!(renders, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn store_is_insert_only() {
        let cache = WaveCache::new();
        let a: CachedShape = vec![1.0].into();
        let b: CachedShape = vec![2.0].into();
        cache.store(request(110.0), a);
        let kept = cache.store(request(110.0), b);
        assert_eq!(&*kept, &[1.0]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&request(220.0)), None);
    }

    #[test]
    fn exact_key_matching() {
        let cache = WaveCache::new();
        cache.get_or_insert_with(request(0.1 + 0.2), Vec::new);
        cache.get_or_insert_with(request(0.3), Vec::new);
        assert_eq!(cache.len(), 2);
        assert!(WaveRequest::new(WaveShape::Sine, f64::NAN, 1.0, SampleFormat::F32).is_none());
    }

    #[test]
    fn format_is_part_of_the_key() {
        let mut a = request(440.0);
        a.format = SampleFormat::I16;
        assert_ne!(a, request(440.0));
    }

    #[test]
    fn synth_reuses_shapes_across_amplitudes() {
        let synth = Synth::new(48_000, SampleFormat::F32);
        let quiet = synth.generate(WaveShape::BandLimitedSquare, 55.0, 0.05, 0.25).unwrap();
        let first = synth.unit_shape(WaveShape::BandLimitedSquare, 55.0, 0.05).unwrap();
        let loud = synth.generate(WaveShape::BandLimitedSquare, 55.0, 0.05, 0.5).unwrap();
        let second = synth.unit_shape(WaveShape::BandLimitedSquare, 55.0, 0.05).unwrap();

        assert_eq!(synth.cache().misses(), 1);
        assert_eq!(synth.cache().hits(), 3);
        assert_eq!(first.len(), second.len());
        assert!(first.iter().zip(second.iter()).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(quiet.peak() <= 0.25);
        assert!(loud.peak() > 0.25);
    }

    #[test]
    fn concurrent_callers_share_one_entry() {
        let synth = Arc::new(Synth::new(48_000, SampleFormat::I16));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let synth = Arc::clone(&synth);
                thread::spawn(move || synth.generate(WaveShape::Organ, 220.0, 0.01, 1000.0).unwrap())
            })
            .collect();
        let buffers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(buffers.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(synth.cache().len(), 1);
        assert_eq!(synth.cache().misses(), 1);
    }
}
