//! Code generation entry point.
//!
//! Compiles `proto/conflowci.proto` into Rust types/service stubs via
//! `tonic-prost-build`, the same build-time-codegen shape the teacher crate
//! uses for its own `build.rs` (there it's `vergen-gitcl` emitting version
//! metadata; here it's protobuf codegen).

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::compile_protos("proto/conflowci.proto")?;
    Ok(())
}
