// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Floats that cannot be NaN by construction, and hence are `Eq` and `Hash`.

use std::hash::{Hash, Hasher};

/// A non-nan f64.
///
/// Negative zero is normalized to positive zero on construction, so that
/// equal values always hash to the same bucket.
///
/// # Examples
///
/// ```
/// use syntone_core::nonnan::F64N;
///
/// assert!(F64N::new(f64::NAN).is_none());
/// assert_eq!(F64N::new(-0.0), F64N::new(0.0));
/// assert_ne!(F64N::new(440.0), F64N::new(440.0 + 1e-12));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct F64N(f64);

impl F64N {
    pub fn new(value: f64) -> Option<F64N> {
        if value.is_nan() {
            None
        } else if value == 0.0 {
            Some(Self(0.0))
        } else {
            Some(Self(value))
        }
    }
}

impl PartialEq for F64N {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for F64N {}

impl Hash for F64N {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}
