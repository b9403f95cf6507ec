// Build script for flutter_rust_bridge code generation
//
// Code generation is run via the CLI tool rather than from here:
//   flutter_rust_bridge_codegen generate
//
// The generated bindings cover the sync functions in src/api.rs.

fn main() {
    // Tell cargo to rerun this build script if api.rs changes
    println!("cargo:rerun-if-changed=src/api.rs");
}
