//! Types used in image processing operations.

use serde::{Deserialize, Serialize};

/// Specifies the order of channels in an image tensor handed to a backbone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Channel, Height, Width order (common in PyTorch exports)
    CHW,
    /// Height, Width, Channel order (common in TensorFlow exports)
    #[default]
    HWC,
}
