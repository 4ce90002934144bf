use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        // SAFETY: single-threaded build script, set before anything reads it.
        unsafe { std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?) };
    }

    println!("cargo:rerun-if-changed=proto/v1/registry.proto");
    println!("cargo:rerun-if-changed=proto/v1/operator.proto");
    println!("cargo:rerun-if-changed=proto");

    let descriptor_path =
        PathBuf::from(std::env::var("OUT_DIR")?).join("kcmregistry_descriptor.bin");

    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .file_descriptor_set_path(descriptor_path)
        .compile_protos(
            &["proto/v1/registry.proto", "proto/v1/operator.proto"],
            &["proto"],
        )?;

    Ok(())
}
