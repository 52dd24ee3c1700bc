use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};
use log::{error, info, warn};
use minifb::{Window, WindowOptions};

use pebblecore::error::{EmuError, LoadStage};
use pebblecore::gb::{Frame, Frontend, GameBoy, NullFrontend};
use pebblecore::ppu::{Color, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Translates a palette-indexed frame into the 0RGB pixel format `minifb`
/// expects and presents it in a window.
struct MinifbFrontend {
    window: Window,
    buffer: Vec<u32>,
}

impl MinifbFrontend {
    fn new() -> Result<Self, EmuError> {
        let window = Window::new(
            "pebblecore",
            SCREEN_WIDTH,
            SCREEN_HEIGHT,
            WindowOptions::default(),
        )
        .map_err(|e| EmuError::construction(format!("failed to open display window: {e}")))?;
        Ok(Self {
            window,
            buffer: vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT],
        })
    }
}

fn shade(color: Color) -> u32 {
    match color {
        Color::White => 0xFFFFFF,
        Color::LightGray => 0xAAAAAA,
        Color::DarkGray => 0x555555,
        Color::Black => 0x000000,
    }
}

impl Frontend for MinifbFrontend {
    fn poll_events(&mut self) -> bool {
        self.window.update();
        self.window.is_open()
    }

    fn present(&mut self, frame: &Frame) {
        for (i, pixel) in frame.iter().enumerate() {
            self.buffer[i] = shade(*pixel);
        }
        let _ = self
            .window
            .update_with_buffer(&self.buffer, SCREEN_WIDTH, SCREEN_HEIGHT);
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let matches = Command::new("pebblecore")
        .version("0.1.0")
        .author("m0x")
        .about("A Game Boy (DMG) core emulator: CPU, memory bus, interrupts, cartridge paging, and frame timing.")
        .arg(
            Arg::new("rom")
                .value_name("ROM")
                .help("Path to the Game Boy ROM file to run.")
                .required(true),
        )
        .arg(
            Arg::new("boot-rom")
                .long("boot-rom")
                .value_name("FILE")
                .help("Optional boot ROM image ($0000-$00FF). Without it, execution starts from the documented post-boot register snapshot."),
        )
        .arg(
            Arg::new("testing")
                .short('t')
                .long("testing")
                .help("Run headless: no window, no frame presentation, and skip any supplied boot ROM in favor of the post-boot register snapshot.")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let rom_path = matches.get_one::<String>("rom").unwrap();
    let testing = matches.get_flag("testing");
    let boot_rom_path = if testing {
        None
    } else {
        matches.get_one::<String>("boot-rom").map(String::as_str)
    };

    if testing {
        warn!("testing mode: running headless, no window will open, boot rom (if any) skipped");
    }

    let mut gameboy = match GameBoy::power_on(rom_path, boot_rom_path) {
        Ok(gb) => gb,
        Err(e) => {
            error!("{e}");
            return exit_code_for(&e);
        }
    };

    info!("starting emulation of {rom_path}");

    let result = if testing {
        let mut frontend = NullFrontend;
        gameboy.run(&mut frontend)
    } else {
        let mut frontend = match MinifbFrontend::new() {
            Ok(frontend) => frontend,
            Err(e) => {
                error!("{e}");
                return exit_code_for(&e);
            }
        };
        gameboy.run(&mut frontend)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ EmuError::DecodeFailure { .. }) => {
            // Locks up the reference hardware; this core just stops
            // stepping and the process still exits cleanly.
            error!("{e}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            exit_code_for(&e)
        }
    }
}

/// Exit codes: 0 normal, 1 failure to construct the
/// emulator, 2 failure to load the ROM, 3 fatal unimplemented mapper.
fn exit_code_for(err: &EmuError) -> ExitCode {
    match err.stage() {
        Some(LoadStage::Construction) => ExitCode::from(1),
        Some(LoadStage::Rom) => ExitCode::from(2),
        Some(LoadStage::UnsupportedMapper) => ExitCode::from(3),
        None => ExitCode::from(1),
    }
}
