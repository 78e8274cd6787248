//! SDL2 window drawing the junction from snapshots.

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::Color;
use sdl2::rect::Rect as SdlRect;
use sdl2::render::Canvas;
use sdl2::video::Window;
use std::time::Duration;
use tracing::info;

use crate::config::GeometryConfig;
use crate::error::{CrossingError, Result};
use crate::geometry::Rect;
use crate::intersection::Intersection;
use crate::pedestrian::PedestrianState;
use crate::route::{Axis, Origin};
use crate::signal::SignalColor;
use crate::snapshot::Snapshot;

const FRAME_DELAY: Duration = Duration::from_millis(16);

const GRASS: Color = Color::RGB(30, 100, 30);
const ROAD: Color = Color::RGB(50, 50, 50);
const CROSSWALK: Color = Color::RGB(200, 200, 200);
const STOP_LINE: Color = Color::RGB(255, 255, 255);
const CAR: Color = Color::RGB(70, 130, 180);
const CAR_EMERGENCY: Color = Color::RGB(220, 20, 60);
const CAR_IGNORING: Color = Color::RGB(255, 165, 0);
const PEDESTRIAN: Color = Color::RGB(57, 255, 20);
const PEDESTRIAN_DOWN: Color = Color::RGB(120, 120, 120);

fn sdl_err(e: impl ToString) -> CrossingError {
    CrossingError::Viewer(e.to_string())
}

fn to_sdl(r: Rect) -> SdlRect {
    SdlRect::new(r.x as i32, r.y as i32, r.w.max(1.0) as u32, r.h.max(1.0) as u32)
}

fn signal_color(c: SignalColor) -> Color {
    match c {
        SignalColor::Green => Color::RGB(0, 255, 0),
        SignalColor::Yellow => Color::RGB(255, 200, 0),
        SignalColor::Red => Color::RGB(255, 0, 0),
    }
}

/// Runs the simulation one tick per frame until the window closes.
/// `E` dispatches an emergency vehicle, `S` prints statistics.
pub fn run(sim: &mut Intersection) -> Result<()> {
    let g = sim.config().geometry.clone();

    let sdl_context = sdl2::init().map_err(sdl_err)?;
    let video_subsystem = sdl_context.video().map_err(sdl_err)?;
    let window = video_subsystem
        .window("SMART CROSSING", g.world_width as u32, g.world_height as u32)
        .position_centered()
        .build()
        .map_err(sdl_err)?;
    let mut canvas = window
        .into_canvas()
        .present_vsync()
        .build()
        .map_err(sdl_err)?;

    info!("viewer started: E = emergency vehicle, S = statistics, Esc = quit");

    let mut event_pump = sdl_context.event_pump().map_err(sdl_err)?;
    'running: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'running,
                Event::KeyDown {
                    keycode: Some(Keycode::E),
                    ..
                } => {
                    sim.spawn_emergency_vehicle();
                }
                Event::KeyDown {
                    keycode: Some(Keycode::S),
                    ..
                } => println!("\n{}", sim.final_stats()),
                _ => {}
            }
        }

        sim.tick();
        draw(&mut canvas, &g, &sim.snapshot())?;
        canvas.present();
        std::thread::sleep(FRAME_DELAY);
    }

    Ok(())
}

fn fill(canvas: &mut Canvas<Window>, color: Color, r: Rect) -> Result<()> {
    canvas.set_draw_color(color);
    canvas.fill_rect(to_sdl(r)).map_err(sdl_err)
}

fn draw(canvas: &mut Canvas<Window>, g: &GeometryConfig, snap: &Snapshot) -> Result<()> {
    canvas.set_draw_color(GRASS);
    canvas.clear();

    let c = g.center();
    let road = g.road_width();
    fill(canvas, ROAD, Rect::new(c.x - road / 2.0, 0.0, road, g.world_height))?;
    fill(canvas, ROAD, Rect::new(0.0, c.y - road / 2.0, g.world_width, road))?;

    for origin in Origin::ALL {
        fill(canvas, CROSSWALK, g.crosswalk(origin))?;
        let sl = g.stop_line(origin);
        let line = if origin.is_horizontal() {
            Rect::new(sl - 1.0, c.y - road / 2.0, 2.0, road)
        } else {
            Rect::new(c.x - road / 2.0, sl - 1.0, road, 2.0)
        };
        fill(canvas, STOP_LINE, line)?;
    }

    // One lamp per approach, just outside the box corner on the driver's right.
    let b = g.junction_box();
    let lamps = [
        (Axis::NorthSouth, Rect::new(b.left() - 20.0, b.top() - 20.0, 14.0, 14.0)),
        (Axis::NorthSouth, Rect::new(b.right() + 6.0, b.bottom() + 6.0, 14.0, 14.0)),
        (Axis::EastWest, Rect::new(b.right() + 6.0, b.top() - 20.0, 14.0, 14.0)),
        (Axis::EastWest, Rect::new(b.left() - 20.0, b.bottom() + 6.0, 14.0, 14.0)),
    ];
    for (axis, lamp) in lamps {
        fill(canvas, signal_color(snap.color(axis)), lamp)?;
    }

    for v in &snap.vehicles {
        let color = if v.emergency {
            CAR_EMERGENCY
        } else if v.ignore_pedestrians {
            CAR_IGNORING
        } else {
            CAR
        };
        fill(canvas, color, v.bounds)?;
    }

    for p in &snap.pedestrians {
        let color = match p.state {
            PedestrianState::Walking => PEDESTRIAN,
            PedestrianState::Down => PEDESTRIAN_DOWN,
        };
        fill(canvas, color, p.bounds)?;
    }

    Ok(())
}
