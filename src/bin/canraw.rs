// cansocket/src/bin/canraw.rs
//
// Send and receive raw CAN frames from the command line.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Simple CLI tool to send and receive raw CAN frames, similar to the
//! 'cansend' and 'candump' programs in 'can-utils'.
//!
//! Frames are given and printed in the `ID#DATA` form, like `123#DEADBEEF`
//! or `18FEF100#01.02.03`.

use anyhow::{anyhow, Context, Result};
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use cansocket::{
    timeout_from_msecs, CanFilter, CanFrame, CanRawSocket, ErrorClass, OpenMode, SocketError,
};
use std::{process, time::Duration};

// Make the app version the same as the package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// --------------------------------------------------------------------------

/// Parses a filter given as `ID:MASK`, both in hex.
fn parse_filter(s: &str) -> Result<CanFilter> {
    let (id, mask) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("Filter '{}' is not in the form ID:MASK", s))?;
    let id = u32::from_str_radix(id, 16).with_context(|| format!("Bad filter ID '{}'", id))?;
    let mask =
        u32::from_str_radix(mask, 16).with_context(|| format!("Bad filter mask '{}'", mask))?;
    Ok(CanFilter::new(id, mask))
}

/// Applies the socket options from the command line.
fn configure(sock: &mut CanRawSocket, opts: &ArgMatches) -> Result<()> {
    if let Some(filters) = opts.get_many::<String>("filter") {
        let filters = filters
            .map(|s| parse_filter(s))
            .collect::<Result<Vec<_>>>()?;
        sock.set_can_filter(&filters);
    }

    if let Some(mask) = opts.get_one::<String>("err-mask") {
        let mask = u32::from_str_radix(mask, 16).context("Bad error mask")?;
        sock.set_error_filter_mask(ErrorClass::from_bits_truncate(mask));
    }

    sock.set_loopback(!opts.contains_id("no-loopback"));
    sock.set_receive_own_messages(opts.contains_id("own"));
    sock.set_fd_frames(opts.contains_id("fd"));
    Ok(())
}

/// Queues the frames and waits for the kernel to take them all.
fn send_frames(
    sock: &mut CanRawSocket,
    frames: &[CanFrame],
    timeout: Option<Duration>,
) -> Result<()> {
    for frame in frames {
        sock.write_frame(frame)
            .with_context(|| format!("Can't send frame '{}'", frame))?;
    }

    while sock.bytes_to_write() > 0 {
        if !sock.wait_for_bytes_written(timeout) {
            return Err(anyhow!("Error sending frames: {}", sock.error_string()));
        }
    }
    Ok(())
}

/// Prints received frames until the count is reached or nothing comes in
/// before the timeout.
fn dump_frames(
    sock: &mut CanRawSocket,
    count: Option<usize>,
    timeout: Option<Duration>,
) -> Result<()> {
    let iface = sock.interface_name().to_string();
    let mut n = 0;

    while count.map_or(true, |count| n < count) {
        if !sock.wait_for_ready_read(timeout) {
            if sock.error() == SocketError::Timeout {
                return Ok(());
            }
            return Err(anyhow!("Error reading frames: {}", sock.error_string()));
        }

        while let Ok(frame) = sock.read_frame() {
            println!("{}  {}", iface, frame);
            n += 1;
            if count == Some(n) {
                break;
            }
        }
    }
    Ok(())
}

fn run(opts: &ArgMatches) -> Result<()> {
    let iface = opts.get_one::<String>("iface").map_or("", |s| s.as_str());

    let frames = opts
        .get_many::<String>("frames")
        .into_iter()
        .flatten()
        .map(|s| s.parse::<CanFrame>().with_context(|| format!("Bad frame '{}'", s)))
        .collect::<Result<Vec<_>>>()?;

    let timeout = opts
        .get_one::<i64>("timeout")
        .copied()
        .and_then(timeout_from_msecs);
    let count = opts.get_one::<usize>("count").copied();

    let mut sock = CanRawSocket::new();
    configure(&mut sock, opts)?;

    if !sock.connect_to_interface(iface, OpenMode::READ_WRITE) {
        return Err(anyhow!("Can't connect to '{}': {}", iface, sock.error_string()));
    }

    send_frames(&mut sock, &frames, timeout)?;

    if frames.is_empty() || count.is_some() {
        dump_frames(&mut sock, count, timeout)?;
    }

    sock.close();
    Ok(())
}

// --------------------------------------------------------------------------

fn main() {
    let opts = Command::new("canraw")
        .version(VERSION)
        .about("Send and receive raw CAN frames")
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
        .arg(
            arg!([frames] "Frames to send, like '123#DEADBEEF'")
                .index(2)
                .multiple_values(true),
        )
        .arg(
            arg!(-f --filter <FILTER> "Receive filter as ID:MASK in hex")
                .required(false)
                .action(ArgAction::Append),
        )
        .arg(arg!(-e --"err-mask" <MASK> "Error classes to receive, in hex").required(false))
        .arg(arg!(--fd "Enable CAN FD frames"))
        .arg(arg!(--own "Receive the frames sent by this socket"))
        .arg(arg!(--"no-loopback" "Don't loop sent frames back to other sockets"))
        .arg(
            arg!(-n --count <N> "Number of frames to receive")
                .required(false)
                .value_parser(value_parser!(usize)),
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
