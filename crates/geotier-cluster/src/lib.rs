//! geotier-cluster — the storage cluster as seen by geotier.
//!
//! Defines the collaborator traits the control loop is written against
//! ([`ClusterControl`], [`ClusterTopology`], [`StorageContent`],
//! [`Geocoder`]), the typed [`ClusterCommand`] vocabulary used by the
//! provisioning and drain steps, and two concrete collaborators:
//!
//! - [`CephCli`] shells out to the `ceph` and `rados` binaries.
//! - [`StaticGeocoder`] resolves `"lat,lon"` strings and configured places.

pub mod ceph;
pub mod command;
pub mod error;
pub mod geocode;
pub mod traits;

pub use ceph::CephCli;
pub use command::{CacheMode, ClusterCommand, CommandOutput, PoolType, PoolVar, EEXIST};
pub use error::{ClusterError, ClusterResult};
pub use geocode::StaticGeocoder;
pub use traits::{ClusterControl, ClusterTopology, GeocodedLocation, Geocoder, StorageContent};
