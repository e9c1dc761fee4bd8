use std::io::Result;

fn main() -> Result<()> {
    let proto_files = &["../shared/proto/gateway.proto"];
    let includes = &["../shared/proto"];

    // Use the bundled protoc so the build does not depend on a system install.
    let protoc = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()))?;
    std::env::set_var("PROTOC", protoc);

    prost_build::compile_protos(proto_files, includes)?;

    // Recompile if any proto file changes
    for proto in proto_files {
        println!("cargo:rerun-if-changed={}", proto);
    }

    Ok(())
}
