use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Sources live at <repo>/specs/v1, two levels above this crate.
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let proto_dir = manifest_dir
        .join("..")
        .join("..")
        .join("specs")
        .join("v1")
        .canonicalize()?;

    let protos: Vec<PathBuf> = [
        "topodata.proto",
        "logutil.proto",
        "tabletmanagerdata.proto",
        "tabletmanagerservice.proto",
    ]
    .iter()
    .map(|f| proto_dir.join(f))
    .collect();

    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    // Only the client side is needed; agents are not served from here.
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&protos, &[proto_dir])?;

    Ok(())
}
