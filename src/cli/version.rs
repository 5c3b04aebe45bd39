pub fn run() {
    println!("tokentrim {}", env!("CARGO_PKG_VERSION"));
    println!(
        "built {} for {}",
        env!("TOKENTRIM_BUILD_DATE"),
        env!("TOKENTRIM_BUILD_TARGET")
    );
}
