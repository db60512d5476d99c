//! Request/reply between two threads of one process.
//!
//! Run with:
//!   cargo run --example request-reply

use std::thread;
use std::time::Duration;

use localsock::channel::{connect, LocalServer};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = LocalServer::bind()?;
    let id = server.id().clone();

    let client = thread::spawn(move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let channel = connect(&id, Duration::from_secs(5))?;
        channel.send(b"what time is it", Duration::from_secs(5))?;
        let reply = channel.receive(Duration::from_secs(5))?;
        println!("reply: {}", String::from_utf8_lossy(&reply));
        Ok(())
    });

    let channel = server.accept(Duration::from_secs(5))?;
    let request = channel.receive(Duration::from_secs(5))?;
    println!("request: {}", String::from_utf8_lossy(&request));
    channel.send(b"time to get a watch", Duration::from_secs(5))?;

    client.join().expect("client thread panicked")?;
    Ok(())
}
