//! Tip-tilt piezo platform control.
//!
//! The [`pi`] module holds the GCS transport, the [`pi::CommandSet`] contract
//! with its hardware ([`pi::E518`]) and simulated implementations, and the
//! two-axis [`pi::TipTilt2Axis`] controller built on top of them.

pub mod pi;
