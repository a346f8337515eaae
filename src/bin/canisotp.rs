// cansocket/src/bin/canisotp.rs
//
// Send and receive ISO-TP payloads from the command line.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Simple CLI tool to send and receive ISO-TP payloads, similar to the
//! 'isotpsend' and 'isotprecv' programs in 'can-utils'.
//!
//! Payloads are given and printed in hex, like `0102DEADBEEF`.

use anyhow::{anyhow, Context, Result};
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use cansocket::{
    id::id_from_raw, timeout_from_msecs, CanIsoTpSocket, FdFlags, Id, IsoTpFlags,
    LinkLayerOptions, OpenMode, SocketError,
};
use std::{process, time::Duration};

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// --------------------------------------------------------------------------

/// Parses a CAN ID given in hex.
fn parse_id(opts: &ArgMatches, name: &str) -> Result<Id> {
    let s = opts
        .get_one::<String>(name)
        .ok_or_else(|| anyhow!("Missing the '{}' ID", name))?;
    let id = u32::from_str_radix(s, 16).with_context(|| format!("Bad CAN ID '{}'", s))?;
    id_from_raw(id).ok_or_else(|| anyhow!("CAN ID '{}' is out of range", s))
}

/// Applies the transport options from the command line.
fn configure(sock: &mut CanIsoTpSocket, opts: &ArgMatches) -> Result<()> {
    let mut tp_opts = sock.isotp_options();
    let mut flags = tp_opts.flags();
    flags.set(IsoTpFlags::LISTEN_MODE, opts.contains_id("listen-only"));
    flags.set(IsoTpFlags::TX_PADDING, opts.contains_id("pad"));
    tp_opts.set_flags(flags);
    sock.set_isotp_options(tp_opts);

    if let Some(&dl) = opts.get_one::<u8>("fd") {
        let ll_opts = LinkLayerOptions::fd(dl, FdFlags::empty())
            .with_context(|| format!("Bad FD data length {}", dl))?;
        sock.set_link_layer_options(ll_opts);
    }
    Ok(())
}

/// Queues the payload and waits for the kernel to take it.
fn send(sock: &mut CanIsoTpSocket, payload: &[u8], timeout: Option<Duration>) -> Result<()> {
    sock.write_data(payload).context("Can't send the payload")?;
    while sock.bytes_to_write() > 0 {
        if !sock.wait_for_bytes_written(timeout) {
            return Err(anyhow!("Error sending: {}", sock.error_string()));
        }
    }
    Ok(())
}

/// Prints what comes in, one read per line, until the timeout expires.
fn dump(sock: &mut CanIsoTpSocket, once: bool, timeout: Option<Duration>) -> Result<()> {
    loop {
        if !sock.wait_for_ready_read(timeout) {
            if sock.error() == SocketError::Timeout {
                return Ok(());
            }
            return Err(anyhow!("Error receiving: {}", sock.error_string()));
        }

        let data = sock.read_all();
        if !data.is_empty() {
            println!("{}", hex::encode_upper(&data));
            if once {
                return Ok(());
            }
        }
    }
}

fn run(opts: &ArgMatches) -> Result<()> {
    let iface = opts.get_one::<String>("iface").map_or("", |s| s.as_str());
    let tx_id = parse_id(opts, "tx")?;
    let rx_id = parse_id(opts, "rx")?;

    let payload = opts
        .get_one::<String>("data")
        .map(|s| hex::decode(s).with_context(|| format!("Bad hex payload '{}'", s)))
        .transpose()?;

    let timeout = opts
        .get_one::<i64>("timeout")
        .copied()
        .and_then(timeout_from_msecs);

    let mut sock = CanIsoTpSocket::new();
    configure(&mut sock, opts)?;

    if !sock.connect_with_ids(iface, tx_id, rx_id, OpenMode::READ_WRITE) {
        return Err(anyhow!("Can't connect to '{}': {}", iface, sock.error_string()));
    }

    match payload {
        Some(payload) => {
            send(&mut sock, &payload, timeout)?;
            if opts.contains_id("wait") {
                dump(&mut sock, true, timeout)?;
            }
        }
        None => dump(&mut sock, false, timeout)?,
    }

    sock.close();
    Ok(())
}

// --------------------------------------------------------------------------

fn main() {
    let opts = Command::new("canisotp")
        .version(VERSION)
        .about("Send and receive ISO-TP payloads")
        .disable_help_flag(true)
        .arg(
            arg!(--help "Print help information")
                .short('?')
                .action(ArgAction::Help)
                .global(true),
        )
        .arg(
            arg!(<iface> "The CAN interface to use, like 'can0', 'vcan0', etc")
                .required(true)
                .index(1),
        )
        .arg(arg!([data] "Payload to send, in hex. Without one, payloads are received").index(2))
        .arg(arg!(-s --tx <ID> "The CAN ID to send to, in hex").required(true))
        .arg(arg!(-d --rx <ID> "The CAN ID to receive on, in hex").required(true))
        .arg(arg!(-p --pad "Pad the sent frames"))
        .arg(arg!(-l --"listen-only" "Don't send flow control frames"))
        .arg(arg!(-w --wait "Wait for a reply after sending"))
        .arg(
            arg!(--fd <DLEN> "Use CAN FD frames with this data length")
                .required(false)
                .value_parser(value_parser!(u8)),
        )
        .arg(
            arg!(-t --timeout <MSEC> "Time to wait, in milliseconds. Negative waits forever")
                .required(false)
                .allow_hyphen_values(true)
                .value_parser(value_parser!(i64)),
        )
        .get_matches();

    if let Err(err) = run(&opts) {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}
