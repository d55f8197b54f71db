//! Constants shared by the training and inference paths.

/// Side length of the square input expected by the feature extractor.
pub const INPUT_SIZE: u32 = 224;

/// Number of color channels after preprocessing.
pub const INPUT_CHANNELS: usize = 3;

/// Divisor that maps 8-bit channel values into `[0, 1]`.
pub const PIXEL_SCALE: f32 = 255.0;

/// File extensions picked up by the dataset builder.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Upper bound on the training mini-batch size.
pub const MAX_BATCH_SIZE: usize = 4096;

/// Version of the on-disk model artifact layout.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Artifact file holding the head architecture.
pub const ARCHITECTURE_FILE: &str = "model.json";

/// Artifact file holding the head weights.
pub const WEIGHTS_FILE: &str = "weights.safetensors";

/// Artifact file holding the label set.
pub const LABELS_FILE: &str = "labels.json";

/// Version of the canonical acne label list.
pub const ACNE_LABELS_VERSION: u32 = 1;

/// Canonical acne classes. The position of a name is its class index.
pub const ACNE_CLASSES: &[&str] = &[
    "whitehead",
    "blackhead",
    "papule",
    "pustule",
    "nodule",
    "cyst",
    "normal",
];
