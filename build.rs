fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc unless the environment provides one
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Compile protobuf files
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/common.proto",
                "proto/signer.proto",
                "proto/accounts.proto",
                "proto/lister.proto",
            ],
            &["proto"],
        )?;

    // Re-run if proto files change
    println!("cargo:rerun-if-changed=proto/common.proto");
    println!("cargo:rerun-if-changed=proto/signer.proto");
    println!("cargo:rerun-if-changed=proto/accounts.proto");
    println!("cargo:rerun-if-changed=proto/lister.proto");

    Ok(())
}
