//! Minimal echo server — accepts one client and echoes messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal, paste the printed identifier:
//!   cargo run --features cli -- send <ID> --data hello --wait

use std::time::Duration;

use localsock::channel::LocalServer;
use localsock::transport::TimeoutSpec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = LocalServer::bind()?;
    println!("{}", server.id());

    let channel = server.accept(TimeoutSpec::Infinite)?;
    eprintln!("client connected");

    loop {
        match channel.receive(Duration::from_secs(30)) {
            Ok(message) => {
                eprintln!("received {} bytes", message.len());
                channel.send(&message, Duration::from_secs(5))?;
            }
            Err(e) => {
                eprintln!("client disconnected: {e}");
                break;
            }
        }
    }

    Ok(())
}
