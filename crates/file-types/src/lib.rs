/*!
Shared data model and error vocabulary for the file indexing and release
service: the [`File`](file::File) and [`Release`](release::Release) records,
the embargo/release-state enums, the index-generation naming scheme, and the
[`Error`](error::Error) type every other crate in the workspace propagates.
*/

pub mod error;
pub mod file;
pub mod filter;
pub mod index_name;
pub mod labels;
pub mod release;
pub mod upstream;

pub use error::{Code, Error, Result};
pub use file::{AdminControls, EmbargoStage, File, FileId, ReleaseState, SongPublishStatus};
pub use filter::{FileFilter, FilterSet};
pub use index_name::{IndexGeneration, Visibility};
pub use labels::Labels;
pub use release::{Release, ReleaseId, ReleasePhase};
