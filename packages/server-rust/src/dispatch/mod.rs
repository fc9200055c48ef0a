//! Request dispatch: binding registry, codec caches, and the pipeline
//! that carries a request from path normalization to a rendered response.

pub mod body;
pub mod cache;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod session;

pub use cache::CodecCache;
pub use config::{AddressingMode, DispatcherConfig, STRICT_RENDER_HEADER};
pub use context::RequestContext;
pub use pipeline::Dispatcher;
pub use registry::{BindingRegistry, RegistryBuilder};
pub use service::{GateError, RestService, ServiceError, ServiceReply};
pub use session::{
    AllowAll, AuthDecision, Authorizer, HeaderSessionId, MemorySessionStore, Session,
    SessionIdStrategy, SessionStore,
};
