//! Per-frame scene extraction: views, culling and draw streams.
//!
//! # Module Contents
//!
//! - [`View`] / [`Frustum`] - matrices and clip planes recomputed every frame
//! - [`DrawCommand`] / [`DrawStream`] - sorted, index-only draw lists
//! - [`RenderableCollector`] - culls proxies into a draw stream

mod collector;
mod draw_stream;
mod view;

pub use collector::{CollectStats, DrawFilter, InstanceData, MESH_INSTANCE_ID_BIT, RenderableCollector};
pub use draw_stream::{DrawCommand, DrawStream, DrawStreamStats, MATERIAL_SET};
pub use view::{Frustum, View, ViewConstants, transform_aabb};
