//! Resource model.
//!
//! Every stored kind is a `{metadata, spec, status}` record. The [`Resource`]
//! trait gives the store and the controller uniform access to those parts.

macro_rules! impl_resource {
    ($ty:ty, $key:ty, $spec:ty, $status:ty) => {
        impl $crate::api::Resource for $ty {
            type Key = $key;
            type Spec = $spec;
            type Status = $status;

            fn meta(&self) -> &$crate::api::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::api::ObjectMeta {
                &mut self.metadata
            }

            fn spec(&self) -> &$spec {
                &self.spec
            }

            fn status(&self) -> &$status {
                &self.status
            }

            fn status_mut(&mut self) -> &mut $status {
                &mut self.status
            }
        }
    };
}

pub mod function;
pub mod meta;
pub mod processor;
pub mod stream;
pub mod validation;
pub mod workload;

use std::fmt::Debug;

use procon_id::{ResourceKind, TypedKey};
use serde::{de::DeserializeOwned, Serialize};

pub use function::{Function, FunctionConditionType, FunctionSpec, FunctionStatus};
pub use meta::{LabelSelector, ObjectMeta, OwnerReference};
pub use processor::{
    Processor, ProcessorConditionType, ProcessorSpec, ProcessorStatus, ProcessorTemplate,
    PROCESSOR_CONDITIONS,
};
pub use stream::{Stream, StreamConditionType, StreamSpec, StreamStatus, DEFAULT_CONTENT_TYPE};
pub use validation::{FieldError, FieldErrors};
pub use workload::{
    Container, EnvVar, Workload, WorkloadConditionType, WorkloadSpec, WorkloadStatus,
    WorkloadTemplate,
};

/// Uniform access to a stored object.
pub trait Resource:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Typed key addressing objects of this kind.
    type Key: TypedKey;

    type Spec: Clone + Debug + PartialEq + Send + Sync;

    type Status: Clone + Debug + PartialEq + Default + Send + Sync;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn spec(&self) -> &Self::Spec;

    fn status(&self) -> &Self::Status;

    fn status_mut(&mut self) -> &mut Self::Status;

    /// The kind of this resource.
    fn kind() -> ResourceKind {
        <Self::Key as TypedKey>::KIND
    }

    /// The typed key of this object.
    fn key(&self) -> Self::Key {
        let meta = self.meta();
        <Self::Key as TypedKey>::from_parts(&meta.namespace, &meta.name)
    }
}
