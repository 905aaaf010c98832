//! MPEG-2 Transport Stream demultiplexer and DVB/SI table parser.
//!
//! A synchronous, pull-based core (see [`parser::Parser`]) that reads
//! 188-byte packets from a [`source::Source`], reassembles PSI/SI
//! sections, decodes PAT/PMT/SDT/EIT/TDT, and yields a typed stream of
//! [`model::Event`]s. TR 101 290 conformance counters are available
//! alongside the SI model when enabled in [`config::Config`].

pub mod adaptation;
pub mod classify;
pub mod config;
pub mod constants;
pub mod continuity;
pub mod crc;
pub mod descriptors;
pub mod framer;
pub mod header;
pub mod model;
pub mod parser;
pub mod pes;
pub mod reassembly;
pub mod report;
pub mod si;
pub mod source;
pub mod stats;
pub mod time;
pub mod tr101;
