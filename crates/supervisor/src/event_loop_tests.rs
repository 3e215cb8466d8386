// SPDX-License-Identifier: MIT

use super::*;
use crate::signal::{self, SignalBus};
use nix::sys::signal::raise;
use serial_test::serial;
use std::os::fd::AsRawFd;

const PIPE_TOKEN: Token = 7;
const TIMER_TOKEN: Token = 9;

#[derive(Default)]
struct Recorder {
    readable: Vec<Token>,
    writable: Vec<Token>,
    timers: Vec<Token>,
    signals: Vec<Signal>,
    stop_after: usize,
    seen: usize,
}

impl Recorder {
    fn new(stop_after: usize) -> Self {
        Self {
            stop_after,
            ..Self::default()
        }
    }

    fn bump(&mut self, ev: &mut dyn EventLoop) {
        self.seen += 1;
        if self.seen >= self.stop_after {
            ev.stop();
        }
    }
}

impl EventHandler for Recorder {
    fn on_readable(&mut self, ev: &mut dyn EventLoop, token: Token) {
        self.readable.push(token);
        self.bump(ev);
    }

    fn on_timer(&mut self, ev: &mut dyn EventLoop, token: Token) {
        self.timers.push(token);
        self.bump(ev);
    }

    fn on_signal(&mut self, ev: &mut dyn EventLoop, signal: Signal) {
        self.signals.push(signal);
        self.bump(ev);
    }

    fn on_writable(&mut self, ev: &mut dyn EventLoop, token: Token) {
        self.writable.push(token);
        self.bump(ev);
    }
}

fn quiet_bus() -> SignalBus {
    signal::clear_queue();
    SignalBus::install(&[]).unwrap()
}

#[test]
#[serial]
fn readable_fd_dispatches_its_token() {
    let (rx, tx) = nix::unistd::pipe().unwrap();
    nix::unistd::write(&tx, b"x").unwrap();

    let mut lp = PollLoop::new(quiet_bus());
    lp.watch_read(rx.as_raw_fd(), PIPE_TOKEN);

    let mut handler = Recorder::new(1);
    lp.run(&mut handler).unwrap();

    assert_eq!(handler.readable, vec![PIPE_TOKEN]);
}

#[test]
#[serial]
fn timer_fires_after_its_delay() {
    let mut lp = PollLoop::new(quiet_bus());
    lp.add_timer(std::time::Duration::from_millis(20), TIMER_TOKEN);
    assert_eq!(lp.timer_count(), 1);

    let started = std::time::Instant::now();
    let mut handler = Recorder::new(1);
    lp.run(&mut handler).unwrap();

    assert_eq!(handler.timers, vec![TIMER_TOKEN]);
    assert!(started.elapsed() >= std::time::Duration::from_millis(20));
    assert_eq!(lp.timer_count(), 0);
}

#[test]
#[serial]
fn queued_signal_reaches_the_handler() {
    signal::clear_queue();
    let bus = SignalBus::install(&[Signal::SIGUSR1]).unwrap();
    raise(Signal::SIGUSR1).unwrap();

    let mut lp = PollLoop::new(bus);
    let mut handler = Recorder::new(1);
    lp.run(&mut handler).unwrap();

    assert_eq!(handler.signals, vec![Signal::SIGUSR1]);
}

#[test]
#[serial]
fn write_interest_dispatches_on_writable() {
    let (_rx, tx) = nix::unistd::pipe().unwrap();

    let mut lp = PollLoop::new(quiet_bus());
    // An empty pipe is immediately writable.
    lp.watch_write(tx.as_raw_fd(), PIPE_TOKEN);

    let mut handler = Recorder::new(1);
    lp.run(&mut handler).unwrap();

    assert_eq!(handler.writable, vec![PIPE_TOKEN]);
    assert!(handler.readable.is_empty());
}

#[test]
#[serial]
fn dropping_write_interest_keeps_read_interest() {
    let (rx, tx) = nix::unistd::pipe().unwrap();
    nix::unistd::write(&tx, b"x").unwrap();

    let mut lp = PollLoop::new(quiet_bus());
    lp.watch_read(rx.as_raw_fd(), PIPE_TOKEN);
    lp.watch_write(rx.as_raw_fd(), PIPE_TOKEN);
    lp.unwatch_write(rx.as_raw_fd());

    let mut handler = Recorder::new(1);
    lp.run(&mut handler).unwrap();

    assert_eq!(handler.readable, vec![PIPE_TOKEN]);
    assert!(handler.writable.is_empty());
}

#[test]
#[serial]
fn unwatched_fd_is_not_dispatched() {
    let (rx, tx) = nix::unistd::pipe().unwrap();
    nix::unistd::write(&tx, b"x").unwrap();

    let mut lp = PollLoop::new(quiet_bus());
    lp.watch_read(rx.as_raw_fd(), PIPE_TOKEN);
    lp.unwatch_read(rx.as_raw_fd());
    lp.add_timer(std::time::Duration::from_millis(10), TIMER_TOKEN);

    let mut handler = Recorder::new(1);
    lp.run(&mut handler).unwrap();

    assert!(handler.readable.is_empty());
    assert_eq!(handler.timers, vec![TIMER_TOKEN]);
}
