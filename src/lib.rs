mod chart;
mod convert;
mod error;
mod mapper;
mod midi_importer;
mod model;
mod timing;
mod util;

pub use chart::*;
pub use convert::*;
pub use error::*;
pub use mapper::*;
pub use midi_importer::*;
pub use model::chart::*;
pub use model::config::*;
pub use model::song::*;
pub use timing::*;
pub use util::*;
