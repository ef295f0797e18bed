//! Drop Service
//!
//! Ad-hoc drop box for the local network. Any device on the same segment can push a
//! file or a text snippet to this host and fetch it back later through a generated
//! URL, optionally handed over as a QR code.
//!
//! ## Features
//!
//! - **Collision-free ingestion**: every upload is named by a fresh v4 UUID; only the
//!   extension of the client filename is kept
//! - **Atomic publish**: objects are staged and renamed into place, so a returned URL
//!   never points at a partial write
//! - **Confined retrieval**: download paths are validated and canonicalized against
//!   the storage root
//! - **LAN discovery**: lists the host's routable IPv4 addresses for building share URLs
//! - **QR codes**: renders any URL as a PNG for scanning from a phone
//!
//! ## Architecture
//!
//! ```text
//!   POST /api/v1/files ─┐
//!   POST /api/v1/texts ─┤                ┌──────────────┐
//!                       ├──▶ Upload  ───▶│ Storage      │
//!                       │    Ingestor    │ Directory    │
//!   GET /uploads/:path ─┼──▶ Retrieval ─▶│  <root>/     │
//!                       │    Server      └──────────────┘
//!   GET /api/v1/addresses ──▶ Address Discovery
//!   GET /api/v1/qrcodes ────▶ QR Advertiser ──▶ image/png
//! ```

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ingest;
pub mod qr;
pub mod retrieval;
pub mod storage;

pub use api::{create_router, start_api_server, AppState, UploadResponse};
pub use config::{Config, ConfigError};
pub use discovery::AddressDiscovery;
pub use error::{DropError, ErrorResponse, Result};
pub use ingest::{StoredObject, UploadIngestor};
pub use qr::QrAdvertiser;
pub use retrieval::{RetrievalServer, RetrievedObject};
pub use storage::StorageDirectory;
