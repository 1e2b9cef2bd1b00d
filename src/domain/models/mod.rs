mod entity;
mod job;
mod relationship;
mod search;
mod snapshot;

pub use entity::{
    ApiEndpointEntity, DataFlowEntity, DependencyEntity, Entity, EntityBatch, EntityKey,
    EntityKind, FieldDef, MethodDef, ParamDef, Provenance, RepoContextEntity, SchemaEntity,
    SchemaRelation, ServiceEntity,
};
pub use job::{
    unix_now, JobState, JobStatus, JobUpdate, Stage, JOB_LOG_CAPACITY, STAGE_ORDER,
};
pub use relationship::{Relationship, UnresolvedReference};
pub use search::{AskAnswer, AskSource, SearchHit, SearchQuery};
pub use snapshot::{GraphEdge, GraphExport, GraphNode, Snapshot, SnapshotSummary};
