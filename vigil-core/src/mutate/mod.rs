//! Document mutators: the panels JSON and the reverse-proxy Caddyfile.

pub mod caddy;
pub mod panels;

pub use caddy::{validate_braces, AliasChange, CaddyBlock, Caddyfile};
pub use panels::{brand_entries, replace_primary, PanelChange, PanelEntry};
