fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Build-time information (git hash, compiler) for the command line summary.
    built::write_built_file().expect("Failed to acquire build-time information");
}
