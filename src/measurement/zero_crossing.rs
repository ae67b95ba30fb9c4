/// A sign change between `samples[index]` and `samples[index + 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroCrossing {
    pub index: usize,
    pub before: f64,
    pub after: f64,
}

impl ZeroCrossing {
    pub fn slope(&self) -> f64 {
        self.after - self.before
    }

    /// Linear-interpolation position of the true zero within `[index, index + 1]`,
    /// as a fraction of one sample. `None` for a flat step.
    pub fn fraction(&self) -> Option<f64> {
        let slope = self.slope();
        if slope == 0.0 {
            return None;
        }
        let fraction = -self.before / slope;
        fraction.is_finite().then_some(fraction)
    }
}

/// Every sign-bit change between consecutive samples, in sample order.
///
/// No threshold or hysteresis: noise around zero produces crossings too, and
/// the span filters downstream are what keep them out of the estimate.
pub fn find_zero_crossings(samples: &[f64]) -> Vec<ZeroCrossing> {
    samples
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0].is_sign_negative() != pair[1].is_sign_negative())
        .map(|(index, pair)| ZeroCrossing {
            index,
            before: pair[0],
            after: pair[1],
        })
        .collect()
}

/// The two interleaved crossing families of a sine. Which one is rising is
/// not determined and nothing downstream depends on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrossingFamilies {
    pub even: Vec<ZeroCrossing>,
    pub odd: Vec<ZeroCrossing>,
}

impl CrossingFamilies {
    pub fn iter(&self) -> impl Iterator<Item = &[ZeroCrossing]> {
        [self.even.as_slice(), self.odd.as_slice()].into_iter()
    }
}

pub fn split_families(crossings: &[ZeroCrossing]) -> CrossingFamilies {
    let mut families = CrossingFamilies::default();
    for (i, crossing) in crossings.iter().enumerate() {
        if i % 2 == 0 {
            families.even.push(*crossing);
        } else {
            families.odd.push(*crossing);
        }
    }
    families
}
