// Enable pedantic lints globally, then allow the noisy ones we're not fixing.
#![warn(clippy::pedantic, clippy::nursery)]
// --- Intentionally allowed ---
#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]
// DSP variable names (bass_lp vs bass_hp, etc.) are intentionally similar
#![allow(clippy::similar_names)]
// Audio code performs intentional casts
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap
)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
// Style/pedantic lints that add noise without value here
#![allow(
    clippy::module_name_repetitions,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::match_same_arms,
    clippy::struct_field_names,
    clippy::unnecessary_wraps,
    clippy::suboptimal_flops
)]
#![allow(clippy::redundant_pub_crate)]

pub mod audio;
pub mod board;
pub mod dsp;
pub mod effects;
pub mod preset;
pub mod settings;
