//! Pointer gestures as input-API-independent state machines.
//!
//! Hosts map their pointer events onto these transitions; the machines
//! only ever hand back requests, the graph is mutated by the caller.

use log::debug;

use crate::node::{NodeId, NodeType, Port, Position, Size};

/// A connection the host should add once a draw gesture completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRequest {
    pub from: NodeId,
    pub to: NodeId,
    pub from_port: Port,
    pub to_port: Port,
}

/// Transient drag that draws a new connection out of a port.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConnectionDraw {
    #[default]
    Idle,
    Drawing {
        from_node: NodeId,
        from_port: Port,
        cursor: Position,
    },
}

impl ConnectionDraw {
    pub fn is_drawing(&self) -> bool {
        matches!(self, ConnectionDraw::Drawing { .. })
    }

    /// Begin a gesture at `anchor`. A gesture already in progress is
    /// cancelled first so at most one is ever in flight.
    pub fn start(&mut self, node: NodeId, port: Port, anchor: Position) {
        if self.is_drawing() {
            debug!("connection draw restarted; cancelling previous gesture");
            self.cancel();
        }
        *self = ConnectionDraw::Drawing {
            from_node: node,
            from_port: port,
            cursor: anchor,
        };
    }

    pub fn move_to(&mut self, point: Position) {
        if let ConnectionDraw::Drawing { cursor, .. } = self {
            *cursor = point;
        }
    }

    /// Release over a port. Returns the connection to create, or `None`
    /// when idle or when released over the originating node.
    pub fn finish(&mut self, to_node: NodeId, to_port: Port) -> Option<ConnectionRequest> {
        let ConnectionDraw::Drawing {
            from_node,
            from_port,
            ..
        } = std::mem::take(self)
        else {
            return None;
        };

        if from_node == to_node {
            debug!("connection draw discarded: released on origin {}", from_node);
            return None;
        }
        Some(ConnectionRequest {
            from: from_node,
            to: to_node,
            from_port,
            to_port,
        })
    }

    /// Release away from any input port.
    pub fn cancel(&mut self) {
        *self = ConnectionDraw::Idle;
    }
}

/// Edge or corner a resize drag grabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeHandle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl ResizeHandle {
    fn grows_east(&self) -> bool {
        matches!(self, ResizeHandle::E | ResizeHandle::NE | ResizeHandle::SE)
    }

    fn grows_west(&self) -> bool {
        matches!(self, ResizeHandle::W | ResizeHandle::NW | ResizeHandle::SW)
    }

    fn grows_south(&self) -> bool {
        matches!(self, ResizeHandle::S | ResizeHandle::SE | ResizeHandle::SW)
    }

    fn grows_north(&self) -> bool {
        matches!(self, ResizeHandle::N | ResizeHandle::NE | ResizeHandle::NW)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResizeGesture {
    #[default]
    Idle,
    Resizing {
        node_id: NodeId,
        node_type: NodeType,
        handle: ResizeHandle,
        start_pointer: Position,
        start_size: Size,
    },
}

impl ResizeGesture {
    pub fn start(
        &mut self,
        node_id: NodeId,
        node_type: NodeType,
        handle: ResizeHandle,
        pointer: Position,
        size: Size,
    ) {
        *self = ResizeGesture::Resizing {
            node_id,
            node_type,
            handle,
            start_pointer: pointer,
            start_size: size,
        };
    }

    /// New size for the node under resize, clamped to its variant's bounds.
    /// `pointer` is in screen space; the delta is scaled by `zoom`.
    pub fn update(&self, pointer: Position, zoom: f64) -> Option<(NodeId, Size)> {
        let ResizeGesture::Resizing {
            node_id,
            node_type,
            handle,
            start_pointer,
            start_size,
        } = self
        else {
            return None;
        };

        let delta = (pointer - *start_pointer) / zoom;
        let mut size = *start_size;
        if handle.grows_east() {
            size.width = start_size.width + delta.x;
        }
        if handle.grows_west() {
            size.width = start_size.width - delta.x;
        }
        if handle.grows_south() {
            size.height = start_size.height + delta.y;
        }
        if handle.grows_north() {
            size.height = start_size.height - delta.y;
        }
        Some((node_id.clone(), node_type.size_bounds().clamp(size)))
    }

    pub fn end(&mut self) {
        *self = ResizeGesture::Idle;
    }
}

/// Holds at most one pending update; the host drains it once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCoalescer<T> {
    pending: Option<T>,
}

impl<T> Default for FrameCoalescer<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> FrameCoalescer<T> {
    /// Queue `value`, replacing anything not yet drained.
    pub fn push(&mut self, value: T) {
        self.pending = Some(value);
    }

    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_lifecycle() {
        let mut draw = ConnectionDraw::default();
        draw.start("t".into(), Port::Output, Position::new(1.0, 1.0));
        draw.move_to(Position::new(50.0, 60.0));
        assert_eq!(
            draw,
            ConnectionDraw::Drawing {
                from_node: "t".into(),
                from_port: Port::Output,
                cursor: Position::new(50.0, 60.0),
            }
        );

        let request = draw.finish("a".into(), Port::Input).unwrap();
        assert_eq!(request.from, NodeId::from("t"));
        assert_eq!(request.to, NodeId::from("a"));
        assert_eq!(request.to_port, Port::Input);
        assert_eq!(draw, ConnectionDraw::Idle);
    }

    #[test]
    fn test_finish_on_origin_is_discarded() {
        let mut draw = ConnectionDraw::default();
        draw.start("t".into(), Port::Output, Position::ORIGIN);
        assert!(draw.finish("t".into(), Port::Input).is_none());
        assert!(!draw.is_drawing());
    }

    #[test]
    fn test_idle_ignores_move_and_finish() {
        let mut draw = ConnectionDraw::default();
        draw.move_to(Position::new(3.0, 3.0));
        assert_eq!(draw, ConnectionDraw::Idle);
        assert!(draw.finish("a".into(), Port::Input).is_none());
    }

    #[test]
    fn test_restart_replaces_gesture() {
        let mut draw = ConnectionDraw::default();
        draw.start("a".into(), Port::Output, Position::ORIGIN);
        draw.start("b".into(), Port::Output, Position::new(9.0, 9.0));
        let request = draw.finish("c".into(), Port::Input).unwrap();
        assert_eq!(request.from, NodeId::from("b"));
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut draw = ConnectionDraw::default();
        draw.start("a".into(), Port::Output, Position::ORIGIN);
        draw.cancel();
        assert_eq!(draw, ConnectionDraw::Idle);
    }

    #[test]
    fn test_resize_south_east_and_clamp() {
        let mut resize = ResizeGesture::default();
        resize.start(
            "c".into(),
            NodeType::AiChat,
            ResizeHandle::SE,
            Position::new(100.0, 100.0),
            Size::new(400.0, 600.0),
        );
        let (_, size) = resize.update(Position::new(150.0, 120.0), 1.0).unwrap();
        assert_eq!(size, Size::new(450.0, 620.0));

        let (_, size) = resize.update(Position::new(5000.0, -5000.0), 1.0).unwrap();
        assert_eq!(size, Size::new(800.0, 450.0));
    }

    #[test]
    fn test_resize_west_shrinks_with_zoom() {
        let mut resize = ResizeGesture::default();
        resize.start(
            "t".into(),
            NodeType::Text,
            ResizeHandle::W,
            Position::ORIGIN,
            Size::new(300.0, 200.0),
        );
        let (_, size) = resize.update(Position::new(40.0, 999.0), 2.0).unwrap();
        assert_eq!(size, Size::new(280.0, 200.0));

        resize.end();
        assert!(resize.update(Position::ORIGIN, 1.0).is_none());
    }

    #[test]
    fn test_coalescer_keeps_latest() {
        let mut frame = FrameCoalescer::default();
        frame.push(1);
        frame.push(2);
        assert!(frame.is_pending());
        assert_eq!(frame.take(), Some(2));
        assert_eq!(frame.take(), None);
    }
}
