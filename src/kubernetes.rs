mod annotation;
mod annotations;
mod api;
pub mod constants;
mod context;
mod error_policy;
pub mod events;
mod labels;
#[cfg(test)]
pub mod mock;
mod object;
mod resource;
mod resource_name;
mod resource_namespace;
mod resource_uid;
mod subset;

pub use annotation::Annotation;
pub use annotations::Annotations;
pub use api::Api;
pub use context::Context;
pub use error_policy::error_policy;
pub use labels::Labels;
pub use object::Object;
pub use resource::Resource;
pub use resource_name::ResourceName;
pub use resource_namespace::ResourceNamespace;
pub use resource_uid::ResourceUid;
pub use subset::Subset;
