#![deny(unreachable_pub)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![allow(clippy::new_ret_no_self)]
#![allow(clippy::type_complexity)]
#![deny(clippy::clone_on_ref_ptr)]
#![deny(clippy::trivially_copy_pass_by_ref)]

//! Stream-aware multiline aggregation.
//!
//! Log lines arrive as [`event::LogEvent`]s from any number of producers. The
//! [`transforms::multiline::Multiline`] transform partitions them by stream
//! identity and folds continuation lines into the event that opened the group.
#[macro_use]
extern crate tracing;

#[macro_use]
pub mod internal_event;

pub mod app;
pub mod cli;
#[allow(unreachable_pub)]
pub mod config;
pub mod event;
#[allow(unreachable_pub)]
pub(crate) mod internal_events;
pub mod template;
pub mod trace;
#[allow(unreachable_pub)]
pub mod transforms;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

pub fn get_version() -> String {
    let pkg_version = env!("CARGO_PKG_VERSION");
    let debug_info = if cfg!(debug_assertions) {
        " debug"
    } else {
        ""
    };

    format!("{pkg_version}{debug_info}")
}

pub fn get_hostname() -> std::io::Result<String> {
    Ok(if let Ok(hostname) = std::env::var("MULTILINE_HOSTNAME") {
        hostname
    } else {
        hostname::get()?.to_string_lossy().into_owned()
    })
}
