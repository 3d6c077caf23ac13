//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{BoundingBox, HuWindow, ImgWriteVis, Spacing, Volume, Voxel, VoxelKind};

pub use crate::consts::{CONTRAST_FLOOR, CORRECTION, DEFAULT_P_LAMBDA};

pub use crate::composite::{composite, place_addition, CompositorConfig, LesionCompositor};
pub use crate::contrast::contrast_factor;
pub use crate::drr::{min_max_normalize, min_max_normalize_per_sample, synthesize};
pub use crate::geometry::NoduleGeometry;
pub use crate::pipeline::{PatchPipeline, PipelineConfig, SynthesizedPatch};
pub use crate::poisson::{poisson_edit, CloneMode, PoissonBlender};
pub use crate::resample::Resampler;

pub use crate::dataset::{self, home_dataset_dir_with, open_host_image, open_volume};
