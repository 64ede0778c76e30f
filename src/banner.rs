pub(crate) fn print_startup_banner(agent: &str, instruction: &str, port: u16) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!();
    eprintln!("──────────────────────────────────────────────────────────────────────");
    eprintln!("   🤖  Agent Battler v{}  -  network capture for coding agents", version);
    eprintln!("──────────────────────────────────────────────────────────────────────");
    eprintln!(
        "    - Build: {} ({}, {})",
        env!("AGENT_BATTLER_BUILD_DATE"),
        env!("AGENT_BATTLER_BUILD_TARGET"),
        env!("AGENT_BATTLER_BUILD_PROFILE")
    );
    eprintln!(
        "    - Platform: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    eprintln!("    - Agent: {}", agent);
    eprintln!("    - Instruction: \"{}\"", instruction);
    eprintln!("    - Proxy: mitmdump on port {}", port);
    eprintln!("──────────────────────────────────────────────────────────────────────");
    eprintln!();
}
