// SPDX-License-Identifier: GPL-3.0-only

//! Segmentation masks and mask smoothing
//!
//! A [`Mask`] holds one foreground probability per pixel. Smoothing is a
//! separable gaussian blur with reflected borders; the result is clamped to
//! [0, 1] because the blur can overshoot at hard edges.

use crate::constants::limits::MIN_KERNEL;

/// Single-channel foreground probability buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    /// Row-major values, `width * height` entries
    pub data: Vec<f32>,
}

impl Mask {
    /// Create a mask from raw values, `None` if the length is wrong
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Mask with every pixel set to `value`
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Fully foreground mask (composites to the untouched frame)
    pub fn full(width: u32, height: u32) -> Self {
        Self::filled(width, height, 1.0)
    }

    /// Fully background mask
    pub fn empty(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    /// Clamp every value into [0, 1]; NaN becomes background
    pub fn clamp_unit(&mut self) {
        for v in &mut self.data {
            *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        }
    }
}

/// Kernel size actually used for smoothing
///
/// Even sizes are bumped to the next odd value; anything below the
/// minimum becomes the minimum.
pub fn effective_kernel_size(kernel: u32) -> u32 {
    let kernel = kernel.max(MIN_KERNEL);
    if kernel % 2 == 0 { kernel + 1 } else { kernel }
}

/// Sigma derived from kernel size when none is given (OpenCV convention)
fn auto_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D gaussian weights
fn gaussian_weights(kernel: u32, sigma: f32) -> Vec<f32> {
    let sigma = if sigma.is_finite() && sigma > 0.0 {
        sigma
    } else {
        auto_sigma(kernel)
    };
    let radius = (kernel / 2) as i32;
    let denom = 2.0 * sigma * sigma;

    let mut weights: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Reflect an out-of-range index back into `0..len` (border excluded: `dcb|abcd|cba`)
fn reflect_101(mut i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

/// Blur a mask with a gaussian kernel and clamp the result to [0, 1]
///
/// The input is not modified. An empty mask is returned unchanged.
pub fn smooth(mask: &Mask, kernel: u32, sigma: f32) -> Mask {
    let width = mask.width as usize;
    let height = mask.height as usize;
    if width == 0 || height == 0 {
        return mask.clone();
    }

    let kernel = effective_kernel_size(kernel);
    let weights = gaussian_weights(kernel, sigma);
    let radius = (kernel / 2) as isize;

    // Horizontal pass
    let mut horizontal = vec![0.0f32; width * height];
    for y in 0..height {
        let row = &mask.data[y * width..(y + 1) * width];
        let out = &mut horizontal[y * width..(y + 1) * width];
        for (x, value) in out.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (k, w) in weights.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - radius, width);
                acc += row[sx] * w;
            }
            *value = acc;
        }
    }

    // Vertical pass
    let mut data = vec![0.0f32; width * height];
    for y in 0..height {
        let rows: Vec<usize> = (0..weights.len())
            .map(|k| reflect_101(y as isize + k as isize - radius, height) * width)
            .collect();
        for x in 0..width {
            let mut acc = 0.0;
            for (row, w) in rows.iter().zip(&weights) {
                acc += horizontal[row + x] * w;
            }
            data[y * width + x] = acc;
        }
    }

    let mut smoothed = Mask {
        width: mask.width,
        height: mask.height,
        data,
    };
    smoothed.clamp_unit();
    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_always_odd_and_at_least_three() {
        for k in 0..200 {
            let effective = effective_kernel_size(k);
            assert_eq!(effective % 2, 1, "kernel {} -> {}", k, effective);
            assert!(effective >= 3);
            assert!(effective >= k);
        }
        assert_eq!(effective_kernel_size(21), 21);
        assert_eq!(effective_kernel_size(20), 21);
        assert_eq!(effective_kernel_size(1), 3);
    }

    #[test]
    fn test_weights_normalized() {
        let weights = gaussian_weights(21, 10.0);
        assert_eq!(weights.len(), 21);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(weights[10] > weights[0]);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(3, 5), 3);
        // Radius larger than the row
        assert!(reflect_101(-7, 3) < 3);
        assert_eq!(reflect_101(4, 1), 0);
    }

    #[test]
    fn test_smooth_output_in_unit_range() {
        // Hard edge plus out-of-range input values
        let mut mask = Mask::empty(16, 8);
        for y in 0..8 {
            for x in 8..16 {
                mask.set(x, y, 1.0);
            }
        }
        mask.set(0, 0, 3.0);
        mask.set(1, 0, -2.0);

        let smoothed = smooth(&mask, 6, 2.0);
        assert_eq!(smoothed.dimensions(), (16, 8));
        assert!(smoothed.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_smooth_constant_mask_unchanged() {
        let mask = Mask::filled(10, 6, 0.5);
        let smoothed = smooth(&mask, 21, 10.0);
        assert!(smoothed.data.iter().all(|v| (v - 0.5).abs() < 1e-4));
    }

    #[test]
    fn test_smooth_softens_edge() {
        let mut mask = Mask::empty(20, 1);
        for x in 10..20 {
            mask.set(x, 0, 1.0);
        }
        let smoothed = smooth(&mask, 5, 1.0);
        let left = smoothed.get(9, 0);
        let right = smoothed.get(10, 0);
        assert!(left > 0.0 && left < 0.5);
        assert!(right > 0.5 && right < 1.0);
    }

    #[test]
    fn test_smooth_does_not_modify_input() {
        let mut mask = Mask::empty(4, 4);
        mask.set(2, 2, 1.0);
        let before = mask.clone();
        let _ = smooth(&mask, 3, 1.0);
        assert_eq!(mask, before);
    }

    #[test]
    fn test_clamp_unit_handles_nan() {
        let mut mask = Mask::from_raw(3, 1, vec![f32::NAN, 2.0, -1.0]).unwrap();
        mask.clamp_unit();
        assert_eq!(mask.data, vec![0.0, 1.0, 0.0]);
    }
}
