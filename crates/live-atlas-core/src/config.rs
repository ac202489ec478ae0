use serde::{Deserialize, Serialize};

/// Atlas configuration.
///
/// The surface starts at `initial_width`/`initial_height` and, when
/// `auto_resize` is on, grows by `growth_factor` on its narrower dimension
/// until a request fits or `max_width`/`max_height` are exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Initial surface width in pixels.
    pub initial_width: u32,
    /// Initial surface height in pixels.
    pub initial_height: u32,
    /// Hard ceiling for surface growth.
    pub max_width: u32,
    pub max_height: u32,
    /// Pixels reserved alongside each packed region (trailing right/bottom
    /// strip of its bin). Region content size = packed bin size - padding.
    pub padding: u32,
    /// Grow the surface automatically when a request does not fit.
    pub auto_resize: bool,
    /// Growth multiplier applied per resize step (must be > 1).
    pub growth_factor: f32,
    /// Trim transparent borders before packing.
    pub trim: bool,
    /// Alpha values <= threshold count as transparent.
    pub trim_threshold: u8,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            initial_width: 64,
            initial_height: 64,
            max_width: 4096,
            max_height: 4096,
            padding: 2,
            auto_resize: true,
            growth_factor: 1.25,
            trim: true,
            trim_threshold: 0,
        }
    }
}

impl AtlasConfig {
    /// Create a fluent builder for `AtlasConfig`.
    pub fn builder() -> AtlasConfigBuilder {
        AtlasConfigBuilder::new()
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AtlasError;

        if self.initial_width == 0 || self.initial_height == 0 {
            return Err(AtlasError::InvalidConfig(format!(
                "initial dimensions must be non-zero, got {}x{}",
                self.initial_width, self.initial_height
            )));
        }
        if self.max_width < self.initial_width || self.max_height < self.initial_height {
            return Err(AtlasError::InvalidConfig(format!(
                "max dimensions ({}x{}) smaller than initial dimensions ({}x{})",
                self.max_width, self.max_height, self.initial_width, self.initial_height
            )));
        }
        if self.growth_factor <= 1.0 {
            return Err(AtlasError::InvalidConfig(format!(
                "growth_factor must be > 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.padding >= self.max_width || self.padding >= self.max_height {
            return Err(AtlasError::InvalidConfig(format!(
                "padding ({}) leaves no usable space within {}x{}",
                self.padding, self.max_width, self.max_height
            )));
        }
        Ok(())
    }
}

/// Builder for `AtlasConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct AtlasConfigBuilder {
    cfg: AtlasConfig,
}

impl AtlasConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: AtlasConfig::default(),
        }
    }
    pub fn initial_size(mut self, w: u32, h: u32) -> Self {
        self.cfg.initial_width = w;
        self.cfg.initial_height = h;
        self
    }
    pub fn max_size(mut self, w: u32, h: u32) -> Self {
        self.cfg.max_width = w;
        self.cfg.max_height = h;
        self
    }
    pub fn padding(mut self, v: u32) -> Self {
        self.cfg.padding = v;
        self
    }
    pub fn auto_resize(mut self, v: bool) -> Self {
        self.cfg.auto_resize = v;
        self
    }
    pub fn growth_factor(mut self, v: f32) -> Self {
        self.cfg.growth_factor = v;
        self
    }
    pub fn trim(mut self, v: bool) -> Self {
        self.cfg.trim = v;
        self
    }
    pub fn trim_threshold(mut self, v: u8) -> Self {
        self.cfg.trim_threshold = v;
        self
    }
    pub fn build(self) -> AtlasConfig {
        self.cfg
    }
}
