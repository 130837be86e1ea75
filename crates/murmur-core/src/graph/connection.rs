//! Connection types and per-unit adjacency lists.
//!
//! A [`Connection`] joins one outlet to one inlet. Its kind is not stored on
//! the connection; it follows from the source outlet's declared kind. Each
//! unit keeps [`LetConnections`]: incoming connections per inlet, split by
//! kind, and outgoing connections per outlet.

use std::fmt;

use crate::unit::{Ports, UnitId};

/// Kind of a connection, fixed by the source outlet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Discrete timestamped messages.
    Message,
    /// Continuous per-block samples.
    Stream,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => f.write_str("message"),
            Self::Stream => f.write_str("stream"),
        }
    }
}

/// A directed edge from `(from, outlet)` to `(to, inlet)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Source unit.
    pub from: UnitId,
    /// Outlet index on the source.
    pub outlet: usize,
    /// Destination unit.
    pub to: UnitId,
    /// Inlet index on the destination.
    pub inlet: usize,
}

impl Connection {
    /// Creates a connection description.
    pub fn new(from: UnitId, outlet: usize, to: UnitId, inlet: usize) -> Self {
        Self {
            from,
            outlet,
            to,
            inlet,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.from, self.outlet, self.to, self.inlet)
    }
}

/// Adjacency lists of one unit.
#[derive(Debug, Default)]
pub(crate) struct LetConnections {
    stream_in: Vec<Vec<Connection>>,
    message_in: Vec<Vec<Connection>>,
    outgoing: Vec<Vec<Connection>>,
    stream_counts: Vec<usize>,
}

impl LetConnections {
    pub fn new(ports: Ports) -> Self {
        let inlets = ports.inlets();
        Self {
            stream_in: vec![Vec::new(); inlets],
            message_in: vec![Vec::new(); inlets],
            outgoing: vec![Vec::new(); ports.outlets()],
            stream_counts: vec![0; inlets],
        }
    }

    /// Extends the lists to a wider port layout, keeping every connection.
    pub fn grow(&mut self, ports: Ports) {
        let inlets = ports.inlets();
        self.stream_in.resize_with(inlets, Vec::new);
        self.message_in.resize_with(inlets, Vec::new);
        self.outgoing.resize_with(ports.outlets(), Vec::new);
        self.stream_counts.resize(inlets, 0);
    }

    pub fn add_incoming(&mut self, kind: ConnectionKind, conn: Connection) {
        match kind {
            ConnectionKind::Stream => {
                self.stream_in[conn.inlet].push(conn);
                self.stream_counts[conn.inlet] += 1;
            }
            ConnectionKind::Message => self.message_in[conn.inlet].push(conn),
        }
    }

    pub fn remove_incoming(&mut self, kind: ConnectionKind, conn: Connection) -> bool {
        let list = match kind {
            ConnectionKind::Stream => &mut self.stream_in[conn.inlet],
            ConnectionKind::Message => &mut self.message_in[conn.inlet],
        };
        let Some(pos) = list.iter().position(|c| *c == conn) else {
            return false;
        };
        list.remove(pos);
        if kind == ConnectionKind::Stream {
            self.stream_counts[conn.inlet] -= 1;
        }
        true
    }

    pub fn add_outgoing(&mut self, conn: Connection) {
        self.outgoing[conn.outlet].push(conn);
    }

    pub fn remove_outgoing(&mut self, conn: Connection) -> bool {
        let list = &mut self.outgoing[conn.outlet];
        match list.iter().position(|c| *c == conn) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn has_outgoing(&self, conn: &Connection) -> bool {
        self.outgoing
            .get(conn.outlet)
            .is_some_and(|list| list.contains(conn))
    }

    /// Stream connections into `inlet`, in connection order.
    pub fn stream_sources(&self, inlet: usize) -> &[Connection] {
        &self.stream_in[inlet]
    }

    /// Message connections into `inlet`, in connection order.
    pub fn message_sources(&self, inlet: usize) -> &[Connection] {
        &self.message_in[inlet]
    }

    /// Connections leaving `outlet`, in connection order.
    pub fn outgoing(&self, outlet: usize) -> &[Connection] {
        &self.outgoing[outlet]
    }

    /// Number of connections leaving `outlet`.
    pub fn fan_out(&self, outlet: usize) -> usize {
        self.outgoing[outlet].len()
    }

    /// Stream connection count per inlet.
    pub fn stream_counts(&self) -> &[usize] {
        &self.stream_counts
    }

    /// True if nothing leaves this unit.
    pub fn is_terminal(&self) -> bool {
        self.outgoing.iter().all(Vec::is_empty)
    }

    pub fn all_incoming(&self) -> impl Iterator<Item = (ConnectionKind, Connection)> + '_ {
        let streams = self.stream_in.iter().flatten().map(|c| (ConnectionKind::Stream, *c));
        let messages = self.message_in.iter().flatten().map(|c| (ConnectionKind::Message, *c));
        streams.chain(messages)
    }

    pub fn all_outgoing(&self) -> impl Iterator<Item = Connection> + '_ {
        self.outgoing.iter().flatten().copied()
    }
}
