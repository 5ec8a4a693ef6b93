//! Fusion configuration.
//!
//! Per-rule switches built with bon, with environment variable fallbacks.

use bon::bon;

/// Which quantization fusions are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionConfig {
    /// Lower convolutions over binary quantization to bit-packed binary convolutions.
    pub binary_convolution: bool,
    /// Normalize binary weight quantization into the convolution's output scale.
    pub binarize_weights: bool,
    /// Fold a constant multiply into the following quantization thresholds.
    pub mul_fake_quantize: bool,
    /// Fold a constant add into the following quantization thresholds.
    pub add_fake_quantize: bool,
    /// Turn `(convert(q) - zero_point) * scale` into a quantization node.
    pub dequantize: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[bon]
impl FusionConfig {
    /// Create a fusion configuration with builder pattern. Every rule is on by default.
    #[builder]
    pub fn builder(
        #[builder(default = true)] binary_convolution: bool,
        #[builder(default = true)] binarize_weights: bool,
        #[builder(default = true)] mul_fake_quantize: bool,
        #[builder(default = true)] add_fake_quantize: bool,
        #[builder(default = true)] dequantize: bool,
    ) -> Self {
        Self { binary_convolution, binarize_weights, mul_fake_quantize, add_fake_quantize, dequantize }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `QFOLD_DISABLE=a,b` - Comma-separated switch names to turn off
    /// * `QFOLD_NO_BINARY_CONV=1` - Keep convolutions arithmetic
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(disabled) = lookup("QFOLD_DISABLE") {
            for name in disabled.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if !config.set(name, false) {
                    tracing::warn!(name, "QFOLD_DISABLE names an unknown fusion");
                }
            }
        }
        if lookup("QFOLD_NO_BINARY_CONV").is_some_and(|v| v.trim() == "1") {
            config.binary_convolution = false;
        }
        config
    }

    /// Set the switch called `name`. Returns false for an unknown name.
    pub fn set(&mut self, name: &str, enabled: bool) -> bool {
        let switch = match name {
            "binary_convolution" => &mut self.binary_convolution,
            "binarize_weights" => &mut self.binarize_weights,
            "mul_fake_quantize" => &mut self.mul_fake_quantize,
            "add_fake_quantize" => &mut self.add_fake_quantize,
            "dequantize" => &mut self.dequantize,
            _ => return false,
        };
        *switch = enabled;
        true
    }
}
