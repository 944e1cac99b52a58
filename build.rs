//! Build script for ufwm
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! used by `ufwm --version`.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
