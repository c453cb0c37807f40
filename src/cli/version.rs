/// Display version information
pub fn execute() {
    println!("clustertrust {}", env!("CARGO_PKG_VERSION"));
    println!("Keeps IPFS-Cluster trusted peers in sync with subnet commitments");
}
