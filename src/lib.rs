// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! # pixnet
//!
//! A pure Rust implementation of the PIXNET graphical application protocol:
//! a wire session between a server that renders pixel-addressed "Pages" and
//! clients that interpret a per-pixel category map to turn pointer/keyboard
//! input into navigation, events, and form submissions, plus the PXNT
//! binary container format those Pages are persisted as on disk.
//!
//! ## Features
//!
//! - **PXNT container codec**: header/footer-checked binary Page files,
//!   optional zlib or LZ4 block compression per section
//! - **Wire protocol**: the full `PIXHND`/`PIXACK`/`PIXNET`/`PIXEVT`/`PIXINP`/
//!   `PIXSCR`/`PIXDRG`/`PIXPNG`/`PIXPOG`/`PIXERR`/`PIXBYE` message set
//! - **Category-map interpreter**: pixel→category lookup, priority
//!   resolution, debounce/drag/scroll helpers
//! - **Async I/O**: built on Tokio for concurrent session handling
//! - **Memory safe**: pure Rust with zero unsafe code in core logic
//!
//! ## Quick Start
//!
//! ```no_run
//! use pixnet::{PixnetServer, ServerConfig};
//! use pixnet::wire::messages::Capabilities;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (server, mut events) = PixnetServer::new(ServerConfig::default(), Capabilities::default());
//!
//!     let server_handle = {
//!         let server = server.clone();
//!         tokio::spawn(async move { server.listen(7621).await })
//!     };
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     server_handle.await??;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Your Application              │
//! │                                         │
//! │  • Publish Pages                        │
//! │  • Receive ServerEvents                 │
//! │  • Control server lifecycle             │
//! └──────────────────┬──────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         PixnetServer (Public)           │
//! │                                         │
//! │  • TCP listener                         │
//! │  • Session registry                     │
//! │  • Event distribution                   │
//! └──────────────────┬──────────────────────┘
//!                    │
//!        ┌───────────┼───────────┐
//!        ▼           ▼           ▼
//!   ┌────────┐ ┌────────┐ ┌────────┐
//!   │Session1│ │Session2│ │SessionN│  (handshake, in_seq/out_seq, keepalive)
//!   └────────┘ └────────┘ └────────┘
//!        │           │           │
//!        └───────────┴───────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │        wire::Message codec              │
//! │      category interpreter (stateless)    │
//! └──────────────────┬──────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │     page::Page  /  pxnt container       │
//! │                                         │
//! │  • Pixel raster + category map          │
//! │  • Category defs, metadata, animation    │
//! └─────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod events;
pub mod interpreter;
pub mod page;
pub mod pxnt;
pub mod server;
pub mod session;
pub mod url;
pub mod wire;

// Re-exports
pub use error::{PixnetError, PxntError, PxntErrorCode, WireError, WireErrorCode};
pub use events::{CloseReason, ServerEvent};
pub use page::Page;
pub use server::{PixnetServer, ServerConfig};
pub use session::{Session, SessionCommand, SessionState};
pub use url::PixnetUrl;
pub use wire::Message;

/// Protocol version this implementation negotiates (§4.4, §6.1).
pub const PROTOCOL_VERSION: u8 = session::SUPPORTED_VERSION;

/// Default PIXNET listening port (§6.1, §6.3).
pub const DEFAULT_PORT: u16 = url::DEFAULT_PORT;
