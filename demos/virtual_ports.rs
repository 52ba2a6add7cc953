//! Expose a virtual MIDI input/output pair and echo everything received.
//!
//! Run with: cargo run --example virtual_ports
//! Then connect a sequencer or keyboard to "Sonora Echo".

#[cfg(not(target_os = "windows"))]
fn main() -> sonora::Result<()> {
    use sonora::prelude::*;
    use std::time::Duration;

    tracing_subscriber::fmt::init();

    let (handler, inbound) = message_channel(1024);
    let ports = VirtualPortManager::builder(Arc::new(MidirHost::new()?))
        .client_name("Sonora Echo")
        .handler(handler)
        .build()?;

    let (input, output) = ports.create_virtual_ports(UniqueId::DEFAULT_INPUT, None)?;
    println!("Virtual input {input}, virtual output {output}. Ctrl-C to quit.");

    loop {
        match inbound.recv_timeout(Duration::from_secs(1)) {
            Ok(message) => {
                println!("{}: {:?}", message.source, message.message);
                ports.send(&message.message)?;
            }
            Err(_) => continue,
        }
    }
}

#[cfg(target_os = "windows")]
fn main() {
    eprintln!("Virtual MIDI ports are not available on Windows");
}
