//! View
//!
//! `render` turns a matrix and cursor into a list of `Primitive`s; it knows
//! the grid layout but nothing about the device. A `DisplaySink` paints
//! those primitives. `draw` does so onto any monochrome
//! `embedded_graphics` target, which is how the SSD1306 sink paints.

#[cfg(feature = "ssd1306")]
pub mod ssd1306;
mod recording;

use crate::grid::{ConnectionMatrix, Cursor};

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    primitives::{Primitive as _, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
    Drawable,
};

pub use embedded_graphics::geometry::{Point, Size};
pub use recording::RecordingDisplay;

/// Text shown when there is nothing to put on the grid.
pub const NO_PORTS: &str = "no MIDI ports";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    /// A live subscription.
    Connection,
    /// The selected cell. Drawn as a frame so a connection under it stays
    /// visible.
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    /// Outline of one grid cell.
    Cell(Rectangle),
    /// Row label, right edge at `anchor.x`, vertically centered on
    /// `anchor.y`.
    Label { anchor: Point, text: String },
    Marker { area: Rectangle, glyph: Glyph },
    /// Text centered on `center`.
    Notice { center: Point, text: String },
}

/// Grid placement on the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub display: Size,
    /// Side of a cell in pixels, outline included. At least 8.
    pub cell_size: u32,
    /// Top-left of the grid; `x` is ignored when right aligned.
    pub origin: Point,
    pub right_align: bool,
    /// Labels longer than this many characters are cut.
    pub label_chars: usize,
    /// Space between a label's right edge and the grid.
    pub label_gap: u32,
}

impl Layout {
    pub fn new(display: Size) -> Layout {
        Layout {
            display,
            cell_size: 12,
            origin: Point::new(64, 8),
            right_align: true,
            label_chars: 10,
            label_gap: 3,
        }
    }

    /// Top-left of the grid for an `n`×`n` matrix.
    pub fn grid_origin(&self, n: usize) -> Point {
        if self.right_align {
            let width = n as u32 * self.cell_size + 1;
            Point::new(
                self.display.width as i32 - width as i32,
                self.origin.y,
            )
        } else {
            self.origin
        }
    }

    fn cell(&self, grid: Point, row: usize, col: usize) -> Rectangle {
        let s = self.cell_size as i32;
        Rectangle::new(
            grid + Point::new(col as i32 * s, row as i32 * s),
            Size::new(self.cell_size + 1, self.cell_size + 1),
        )
    }
}

fn inset(cell: &Rectangle, by: u32) -> Rectangle {
    Rectangle::new(
        cell.top_left + Point::new(by as i32, by as i32),
        Size::new(
            cell.size.width.saturating_sub(2 * by),
            cell.size.height.saturating_sub(2 * by),
        ),
    )
}

/// Draw list for one frame: cell outlines, row labels, connection markers,
/// then the cursor marker.
pub fn render(matrix: &ConnectionMatrix, cursor: Cursor, layout: &Layout) -> Vec<Primitive> {
    let n = matrix.len();
    if n == 0 {
        return vec![Primitive::Notice {
            center: Point::new(
                layout.display.width as i32 / 2,
                layout.display.height as i32 / 2,
            ),
            text: NO_PORTS.to_string(),
        }];
    }

    let grid = layout.grid_origin(n);
    let mut out = Vec::with_capacity(n * n * 2 + n + 1);

    for row in 0..n {
        for col in 0..n {
            out.push(Primitive::Cell(layout.cell(grid, row, col)));
        }
    }

    for (row, label) in matrix.labels().into_iter().enumerate() {
        let center = layout.cell(grid, row, 0).center();
        out.push(Primitive::Label {
            anchor: Point::new(grid.x - layout.label_gap as i32, center.y),
            text: label.chars().take(layout.label_chars).collect(),
        });
    }

    for (row, col) in matrix.connections() {
        out.push(Primitive::Marker {
            area: inset(&layout.cell(grid, row, col), 4),
            glyph: Glyph::Connection,
        });
    }

    if cursor.in_bounds(n) {
        out.push(Primitive::Marker {
            area: inset(&layout.cell(grid, cursor.row, cursor.col), 2),
            glyph: Glyph::Cursor,
        });
    }

    out
}

/// Paints primitives onto a monochrome target.
pub fn draw<D>(target: &mut D, primitives: &[Primitive]) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let font = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 1);
    let fill = PrimitiveStyle::with_fill(BinaryColor::On);

    for primitive in primitives {
        match primitive {
            Primitive::Cell(rect) => rect.into_styled(stroke).draw(target)?,
            Primitive::Marker { area, glyph } => match glyph {
                Glyph::Connection => area.into_styled(fill).draw(target)?,
                Glyph::Cursor => area.into_styled(stroke).draw(target)?,
            },
            Primitive::Label { anchor, text } => {
                let style = TextStyleBuilder::new()
                    .alignment(Alignment::Right)
                    .baseline(Baseline::Middle)
                    .build();
                Text::with_text_style(text, *anchor, font, style).draw(target)?;
            }
            Primitive::Notice { center, text } => {
                let style = TextStyleBuilder::new()
                    .alignment(Alignment::Center)
                    .baseline(Baseline::Middle)
                    .build();
                Text::with_text_style(text, *center, font, style).draw(target)?;
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum DisplayError {
    /// The display could not be reached at startup.
    Unavailable(String),
    /// A transfer to the display failed.
    Io(String),
}

/// The one display this process paints.
pub trait DisplaySink {
    fn size(&self) -> Size;

    /// Replaces the whole screen with `primitives`.
    fn paint(&mut self, primitives: &[Primitive]) -> Result<(), DisplayError>;

    /// Blanks the panel and lets go of it.
    fn release(&mut self) -> Result<(), DisplayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Capability, Port, PortId, TopologySnapshot};

    use embedded_graphics::{geometry::OriginDimensions, primitives::PointsIter, Pixel};
    use std::convert::Infallible;

    const W: u32 = 128;
    const H: u32 = 64;

    struct Canvas {
        px: Vec<bool>,
    }

    impl Canvas {
        fn new() -> Canvas {
            Canvas {
                px: vec![false; (W * H) as usize],
            }
        }

        fn lit(&self, area: &Rectangle) -> usize {
            area.points()
                .filter(|p| self.px[(p.y as u32 * W + p.x as u32) as usize])
                .count()
        }
    }

    impl OriginDimensions for Canvas {
        fn size(&self) -> Size {
            Size::new(W, H)
        }
    }

    impl DrawTarget for Canvas {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            for Pixel(p, c) in pixels {
                if p.x >= 0 && p.y >= 0 && (p.x as u32) < W && (p.y as u32) < H {
                    self.px[(p.y as u32 * W + p.x as u32) as usize] = c.is_on();
                }
            }
            Ok(())
        }
    }

    fn matrix(labels: &[&str], links: &[(usize, usize)]) -> ConnectionMatrix {
        let ports: Vec<Port> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| Port::new(PortId::new(20 + i as i32, 0), l, Capability::DUPLEX))
            .collect();
        let mut snap = TopologySnapshot::new(ports.clone());
        for &(s, d) in links {
            snap.connect(ports[s].id, ports[d].id);
        }
        ConnectionMatrix::build(&snap)
    }

    fn count(prims: &[Primitive], f: impl Fn(&Primitive) -> bool) -> usize {
        prims.iter().filter(|p| f(p)).count()
    }

    #[test]
    fn draws_everything_in_order() {
        let m = matrix(&["keys", "drums", "synth"], &[(0, 1), (1, 2)]);
        let layout = Layout::new(Size::new(W, H));
        let prims = render(&m, Cursor::new(0, 1), &layout);

        assert_eq!(count(&prims, |p| matches!(p, Primitive::Cell(_))), 9);
        assert_eq!(count(&prims, |p| matches!(p, Primitive::Label { .. })), 3);
        assert_eq!(
            count(&prims, |p| matches!(
                p,
                Primitive::Marker {
                    glyph: Glyph::Connection,
                    ..
                }
            )),
            2
        );
        assert!(matches!(
            prims.last(),
            Some(Primitive::Marker {
                glyph: Glyph::Cursor,
                ..
            })
        ));
    }

    #[test]
    fn right_aligned_grid_touches_right_edge() {
        let m = matrix(&["a", "b", "c", "d"], &[]);
        let layout = Layout::new(Size::new(W, H));
        let prims = render(&m, Cursor::default(), &layout);
        let right = prims
            .iter()
            .filter_map(|p| match p {
                Primitive::Cell(r) => r.bottom_right(),
                _ => None,
            })
            .map(|p| p.x)
            .max();
        assert_eq!(right, Some(W as i32 - 1));
    }

    #[test]
    fn left_aligned_grid_uses_origin() {
        let m = matrix(&["a", "b"], &[]);
        let mut layout = Layout::new(Size::new(W, H));
        layout.right_align = false;
        layout.origin = Point::new(70, 4);
        match &render(&m, Cursor::default(), &layout)[0] {
            Primitive::Cell(r) => assert_eq!(r.top_left, Point::new(70, 4)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn labels_are_truncated_and_left_of_grid() {
        let m = matrix(&["Launchkey Mini MK3", "x"], &[]);
        let layout = Layout::new(Size::new(W, H));
        let grid = layout.grid_origin(2);
        let prims = render(&m, Cursor::default(), &layout);
        let labels: Vec<_> = prims
            .iter()
            .filter_map(|p| match p {
                Primitive::Label { anchor, text } => Some((*anchor, text.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(labels[0].1, "Launchkey ");
        assert_eq!(labels[1].1, "x");
        assert!(labels.iter().all(|(a, _)| a.x < grid.x));
        assert!(labels[0].0.y < labels[1].0.y);
    }

    #[test]
    fn empty_matrix_shows_notice() {
        let prims = render(&ConnectionMatrix::empty(), Cursor::default(), &Layout::new(Size::new(W, H)));
        assert_eq!(
            prims,
            vec![Primitive::Notice {
                center: Point::new(64, 32),
                text: NO_PORTS.to_string()
            }]
        );
    }

    #[test]
    fn cursor_outside_matrix_is_not_drawn() {
        let m = matrix(&["a", "b", "c"], &[]);
        let prims = render(&m, Cursor::new(3, 0), &Layout::new(Size::new(W, H)));
        assert_eq!(count(&prims, |p| matches!(p, Primitive::Marker { .. })), 0);
    }

    #[test]
    fn cursor_on_connection_stays_distinguishable() {
        let m = matrix(&["a", "b"], &[(0, 1)]);
        let layout = Layout::new(Size::new(W, H));
        let grid = layout.grid_origin(2);

        let mut plain = Canvas::new();
        draw(&mut plain, &render(&m, Cursor::new(1, 1), &layout)).unwrap();
        let mut both = Canvas::new();
        draw(&mut both, &render(&m, Cursor::new(0, 1), &layout)).unwrap();

        let cell = layout.cell(grid, 0, 1);
        let connection = inset(&cell, 4);
        // the connection square survives under the cursor frame
        assert_eq!(both.lit(&connection), plain.lit(&connection));
        assert!(both.lit(&cell) > plain.lit(&cell));
    }
}
