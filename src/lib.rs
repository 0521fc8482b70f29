//! Mesh Topology Operator
//!
//! Converges declared mesh topology objects with a remote managed mesh
//! service. Each declared object maps to one remote resource, which this
//! operator creates, updates and deletes as long as its account controls it.
//!
//! ## Custom Resources
//!
//! - `Mesh`: cluster-scoped root of a mesh
//! - `VirtualGateway`: ingress into the mesh
//! - `VirtualNode`: a workload and the services it calls
//! - `VirtualRouter`: routes traffic across virtual nodes
//! - `VirtualService`: a name backed by a node or a router
//! - `GatewayRoute`: routes gateway traffic to a virtual service
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: appmesh.meshops.io/v1beta1
//! kind: VirtualNode
//! metadata:
//!   name: reviews
//!   namespace: bookinfo
//! spec:
//!   meshRef:
//!     name: global
//!     uid: 5b1e0c3e-7d4e-4a53-9f1c-0c7c7a1b2f10
//!   listeners:
//!     - portMapping:
//!         port: 9080
//!         protocol: http
//! ```

pub mod conditions;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod leader_election;
pub mod manager;
pub mod membership;
pub mod references;
pub mod remote;
pub mod selector;
pub mod store;

pub use crd::{GatewayRoute, Mesh, MeshObject, VirtualGateway, VirtualNode, VirtualRouter, VirtualService};
pub use error::{OperatorError, Result};
