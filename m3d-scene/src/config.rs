//! Scene configuration

/// Scene configuration
#[derive(Debug, Clone, Copy)]
pub struct SceneConfig {
    /// Object slots reserved up front
    pub initial_capacity: usize,
    /// Channels that may be registered at once
    pub max_channels: usize,
    /// Meshes with more triangles are hit-tested in parallel
    pub parallel_triangle_threshold: usize,
    /// Relative epsilon of the ray/triangle parallel test
    pub triangle_epsilon: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            max_channels: 8,
            parallel_triangle_threshold: 4096,
            triangle_epsilon: 1e-12,
        }
    }
}
