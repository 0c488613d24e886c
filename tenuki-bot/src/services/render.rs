//! Media renderer: board diagrams, key-move animations, win-rate chart.
//!
//! Everything here is deterministic: a spec goes in, encoded bytes come
//! out. Numerals are drawn from a built-in 5x7 glyph table so no font
//! asset ships with the binary.

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
    draw_line_segment_mut,
};
use imageproc::rect::Rect;

use go_engine::{Point, SIZE};

use crate::error::{BotError, Result};

const CELL: i32 = 32;
const MARGIN: i32 = 32;
const BOARD_PX: u32 = (MARGIN * 2 + CELL * (SIZE as i32 - 1)) as u32;
const STONE_RADIUS: i32 = 14;

const WOOD: Rgba<u8> = Rgba([219, 179, 119, 255]);
const LINE: Rgba<u8> = Rgba([70, 48, 22, 255]);
const BLACK_STONE: Rgba<u8> = Rgba([22, 22, 22, 255]);
const WHITE_STONE: Rgba<u8> = Rgba([245, 245, 245, 255]);
const WHITE_EDGE: Rgba<u8> = Rgba([90, 90, 90, 255]);
const LAST_MOVE: Rgba<u8> = Rgba([204, 48, 48, 255]);
const PLAYED_MARK: Rgba<u8> = Rgba([204, 48, 48, 255]);
const RECOMMENDED_MARK: Rgba<u8> = Rgba([34, 160, 72, 255]);
const CHART_BG: Rgba<u8> = Rgba([252, 252, 250, 255]);
const CHART_GRID: Rgba<u8> = Rgba([210, 210, 210, 255]);
const CHART_LINE: Rgba<u8> = Rgba([40, 90, 200, 255]);

/// Highlight drawn around an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Played,
    Recommended,
}

/// Everything one rendered board diagram needs.
#[derive(Debug, Clone, Default)]
pub struct BoardSpec {
    /// Row-major 19x19 grid, row 0 at the top: 0 empty, 1 black, -1 white.
    pub grid: Vec<i8>,
    pub last_move: Option<Point>,
    /// Ply numbers drawn on their stones.
    pub numbers: Vec<(Point, u32)>,
    pub marks: Vec<(Point, Mark)>,
    /// Black-positive ownership in [-1, 1], row-major; drawn as scaled
    /// territory squares.
    pub ownership: Option<Vec<f64>>,
}

impl BoardSpec {
    pub fn from_grid(grid: &[i8]) -> Self {
        BoardSpec {
            grid: grid.to_vec(),
            ..Default::default()
        }
    }
}

fn center(point: Point) -> (i32, i32) {
    let (row, col) = point;
    (MARGIN + CELL * col as i32, MARGIN + CELL * row as i32)
}

fn star_points() -> [Point; 9] {
    [
        (3, 3),
        (3, 9),
        (3, 15),
        (9, 3),
        (9, 9),
        (9, 15),
        (15, 3),
        (15, 9),
        (15, 15),
    ]
}

fn draw_board_image(spec: &BoardSpec) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(BOARD_PX, BOARD_PX, WOOD);

    // Grid.
    for i in 0..SIZE as i32 {
        let offset = (MARGIN + CELL * i) as f32;
        let lo = MARGIN as f32;
        let hi = (MARGIN + CELL * (SIZE as i32 - 1)) as f32;
        draw_line_segment_mut(&mut img, (lo, offset), (hi, offset), LINE);
        draw_line_segment_mut(&mut img, (offset, lo), (offset, hi), LINE);
    }
    for star in star_points() {
        let (x, y) = center(star);
        draw_filled_circle_mut(&mut img, (x, y), 3, LINE);
    }

    // Territory squares under the stones.
    if let Some(ownership) = &spec.ownership {
        for row in 0..SIZE {
            for col in 0..SIZE {
                let idx = row as usize * SIZE as usize + col as usize;
                let Some(&v) = ownership.get(idx) else {
                    continue;
                };
                if v.abs() < 0.1 {
                    continue;
                }
                let color = if v > 0.0 { BLACK_STONE } else { WHITE_STONE };
                let half = (3.0 + 6.0 * v.abs().min(1.0)) as i32;
                let (x, y) = center((row, col));
                draw_filled_rect_mut(
                    &mut img,
                    Rect::at(x - half, y - half).of_size((half * 2) as u32, (half * 2) as u32),
                    color,
                );
            }
        }
    }

    // Stones.
    for row in 0..SIZE {
        for col in 0..SIZE {
            let idx = row as usize * SIZE as usize + col as usize;
            let (x, y) = center((row, col));
            match spec.grid.get(idx).copied() {
                Some(1) => {
                    draw_filled_circle_mut(&mut img, (x, y), STONE_RADIUS, BLACK_STONE);
                }
                Some(-1) => {
                    draw_filled_circle_mut(&mut img, (x, y), STONE_RADIUS, WHITE_STONE);
                    draw_hollow_circle_mut(&mut img, (x, y), STONE_RADIUS, WHITE_EDGE);
                }
                _ => {}
            }
        }
    }

    // Ply numbers: black digits on white stones, white on black, dark on
    // empty points (principal-variation steps).
    for &(point, number) in &spec.numbers {
        let idx = point.0 as usize * SIZE as usize + point.1 as usize;
        let color = match spec.grid.get(idx).copied() {
            Some(1) => WHITE_STONE,
            Some(-1) => BLACK_STONE,
            _ => LINE,
        };
        let (x, y) = center(point);
        draw_number(&mut img, x, y, number, color);
    }

    // Last-move marker.
    if let Some(point) = spec.last_move {
        let (x, y) = center(point);
        draw_hollow_circle_mut(&mut img, (x, y), STONE_RADIUS / 2, LAST_MOVE);
    }

    // Highlight boxes.
    for &(point, mark) in &spec.marks {
        let color = match mark {
            Mark::Played => PLAYED_MARK,
            Mark::Recommended => RECOMMENDED_MARK,
        };
        let (x, y) = center(point);
        let half = STONE_RADIUS + 2;
        draw_hollow_rect_mut(
            &mut img,
            Rect::at(x - half, y - half).of_size((half * 2) as u32, (half * 2) as u32),
            color,
        );
    }

    img
}

/// Render one board diagram as PNG bytes.
pub fn board_png(spec: &BoardSpec) -> Result<Vec<u8>> {
    encode_png(draw_board_image(spec))
}

/// Encode an animation: one second per frame, five on the last so the
/// final position can be read, looping forever.
pub fn animation_gif(frames: &[BoardSpec]) -> Result<Vec<u8>> {
    if frames.is_empty() {
        return Err(BotError::Media("animation with no frames".to_string()));
    }
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, 10);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| BotError::Media(e.to_string()))?;
        let last = frames.len() - 1;
        for (i, spec) in frames.iter().enumerate() {
            let delay_ms = if i == last { 5000 } else { 1000 };
            let frame = Frame::from_parts(
                draw_board_image(spec),
                0,
                0,
                Delay::from_numer_denom_ms(delay_ms, 1),
            );
            encoder
                .encode_frame(frame)
                .map_err(|e| BotError::Media(e.to_string()))?;
        }
    }
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Win-rate chart
// ---------------------------------------------------------------------------

const CHART_W: u32 = 800;
const CHART_H: u32 = 480;
const CHART_MARGIN: i32 = 48;

/// Centripetal-free uniform Catmull-Rom interpolation through `points`,
/// `samples` interpolated positions per segment.
pub fn catmull_rom(points: &[(f32, f32)], samples: usize) -> Vec<(f32, f32)> {
    if points.len() < 3 || samples == 0 {
        return points.to_vec();
    }
    let n = points.len();
    let at = |i: isize| -> (f32, f32) { points[i.clamp(0, n as isize - 1) as usize] };
    let mut out = Vec::with_capacity((n - 1) * samples + 1);
    out.push(points[0]);
    for seg in 0..n - 1 {
        let p0 = at(seg as isize - 1);
        let p1 = at(seg as isize);
        let p2 = at(seg as isize + 1);
        let p3 = at(seg as isize + 2);
        for s in 1..=samples {
            let t = s as f32 / samples as f32;
            let t2 = t * t;
            let t3 = t2 * t;
            let x = 0.5
                * ((2.0 * p1.0)
                    + (-p0.0 + p2.0) * t
                    + (2.0 * p0.0 - 5.0 * p1.0 + 4.0 * p2.0 - p3.0) * t2
                    + (-p0.0 + 3.0 * p1.0 - 3.0 * p2.0 + p3.0) * t3);
            let y = 0.5
                * ((2.0 * p1.1)
                    + (-p0.1 + p2.1) * t
                    + (2.0 * p0.1 - 5.0 * p1.1 + 4.0 * p2.1 - p3.1) * t2
                    + (-p0.1 + 3.0 * p1.1 - 3.0 * p2.1 + p3.1) * t3);
            out.push((x, y));
        }
    }
    out
}

/// Black's winning percentage over ply, smoothed, as PNG bytes.
pub fn winrate_chart_png(points: &[(u32, f64)]) -> Result<Vec<u8>> {
    let mut img = RgbaImage::from_pixel(CHART_W, CHART_H, CHART_BG);

    let plot_w = CHART_W as i32 - 2 * CHART_MARGIN;
    let plot_h = CHART_H as i32 - 2 * CHART_MARGIN;
    let max_ply = points.iter().map(|&(p, _)| p).max().unwrap_or(1).max(1);

    let to_xy = |ply: f32, pct: f32| -> (f32, f32) {
        let x = CHART_MARGIN as f32 + plot_w as f32 * ply / max_ply as f32;
        let y = CHART_MARGIN as f32 + plot_h as f32 * (1.0 - pct / 100.0);
        (x, y)
    };

    // Horizontal gridlines every 25%, labeled by value.
    for pct in [0u32, 25, 50, 75, 100] {
        let (x0, y) = to_xy(0.0, pct as f32);
        let (x1, _) = to_xy(max_ply as f32, pct as f32);
        draw_line_segment_mut(&mut img, (x0, y), (x1, y), CHART_GRID);
        draw_number(&mut img, CHART_MARGIN - 20, y as i32, pct, LINE);
    }
    // Axes.
    let origin = to_xy(0.0, 0.0);
    let top = to_xy(0.0, 100.0);
    let right = to_xy(max_ply as f32, 0.0);
    draw_line_segment_mut(&mut img, origin, top, LINE);
    draw_line_segment_mut(&mut img, origin, right, LINE);

    if !points.is_empty() {
        let control: Vec<(f32, f32)> = points
            .iter()
            .map(|&(ply, pct)| to_xy(ply as f32, pct.clamp(0.0, 100.0) as f32))
            .collect();
        let smooth = catmull_rom(&control, 16);
        for pair in smooth.windows(2) {
            draw_line_segment_mut(&mut img, pair[0], pair[1], CHART_LINE);
        }
    }

    encode_png(img)
}

// ---------------------------------------------------------------------------
// Digits
// ---------------------------------------------------------------------------

/// 5x7 digit glyphs, one row per byte, most significant of 5 bits first.
const DIGIT_ROWS: [[u8; 7]; 10] = [
    [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
    [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
    [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
    [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
    [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
];

/// Draw `number` centered on (cx, cy).
fn draw_number(img: &mut RgbaImage, cx: i32, cy: i32, number: u32, color: Rgba<u8>) {
    let digits: Vec<usize> = number
        .to_string()
        .bytes()
        .map(|b| (b - b'0') as usize)
        .collect();
    let total_w = digits.len() as i32 * 6 - 1;
    let mut x0 = cx - total_w / 2;
    let y0 = cy - 3;
    for digit in digits {
        for (dy, row) in DIGIT_ROWS[digit].iter().enumerate() {
            for dx in 0..5 {
                if row & (0b10000 >> dx) != 0 {
                    let x = x0 + dx;
                    let y = y0 + dy as i32;
                    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
                        img.put_pixel(x as u32, y as u32, color);
                    }
                }
            }
        }
        x0 += 6;
    }
}

fn encode_png(img: RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| BotError::Media(e.to_string()))?;
    Ok(bytes)
}
