//! The once-per-frame renderer.
//!
//! Painting happens from the per-scanline register snapshots plus the current
//! VRAM/OAM contents, so mid-frame scroll or palette writes land on exactly
//! the lines they were latched for.

use itertools::Itertools;
use tinyvec::ArrayVec;

use crate::hardware::ppu::fetcher::{self, pixel_from_tile_row, window_on_line, FifoPixel};
use crate::hardware::ppu::palette::{DisplayColour, Palette, RGB};
use crate::hardware::ppu::register_flags::{AttributeFlags, LcdControl};
use crate::hardware::ppu::{
    LineRegisters, FRAMEBUFFER_SIZE, OAM_SIZE, PPU, RESOLUTION_HEIGHT, RESOLUTION_WIDTH,
    VRAM_BANK_SIZE,
};
use crate::EmulatorOptions;

/// The maximum amount of sprites the hardware will select per scanline.
const SPRITES_PER_LINE: usize = 10;

#[derive(Debug, Default, Copy, Clone)]
struct SpriteAttribute {
    y: u8,
    x: u8,
    tile: u8,
    flags: AttributeFlags,
}

pub fn render_frame(ppu: &PPU, options: &EmulatorOptions, buffer: &mut [u8; FRAMEBUFFER_SIZE]) {
    if ppu.get_lcd_control() & 0x80 == 0 {
        // Display off: the panel shows a uniform white.
        for byte in buffer.iter_mut() {
            *byte = 0xFF;
        }
        return;
    }

    for ly in 0..RESOLUTION_HEIGHT {
        render_line(ppu, options, ly as u8, buffer);
    }
}

fn render_line(
    ppu: &PPU,
    options: &EmulatorOptions,
    ly: u8,
    buffer: &mut [u8; FRAMEBUFFER_SIZE],
) {
    let regs = ppu.line_registers[ly as usize];
    let lcdc = LcdControl::from_bits_truncate(regs.lcdc);
    let cgb = ppu.cgb_mode();
    let cgb_attributes = cgb && options.use_cgb_bg && !ppu.dmg_compat();
    let greys = DisplayColour::default();

    let bg_line: [FifoPixel; RESOLUTION_WIDTH] =
        if cgb || lcdc.contains(LcdControl::BG_WINDOW_PRIORITY) {
            if options.use_fetcher_bg {
                fetcher::fetch_line(&ppu.vram, &regs, ly, cgb, cgb_attributes)
            } else {
                scanline_walk(&ppu.vram, &regs, ly, cgb, cgb_attributes)
            }
        } else {
            // DMG with LCDC.0 clear: background and window render blank.
            [FifoPixel::default(); RESOLUTION_WIDTH]
        };

    let mut colours = [RGB::default(); RESOLUTION_WIDTH];
    let bg_blank = !cgb && !lcdc.contains(LcdControl::BG_WINDOW_PRIORITY);
    for x in 0..RESOLUTION_WIDTH {
        colours[x] = if bg_blank {
            greys.white
        } else {
            background_colour(ppu, &regs, bg_line[x], cgb, cgb_attributes, &greys)
        };
    }

    if lcdc.contains(LcdControl::SPRITE_DISPLAY_ENABLE) {
        compose_sprites(ppu, &regs, lcdc, ly, &bg_line, &mut colours, cgb, &greys);
    }

    let row_offset = ly as usize * RESOLUTION_WIDTH * 4;
    for (x, colour) in colours.iter().enumerate() {
        let offset = row_offset + x * 4;
        buffer[offset] = colour.0;
        buffer[offset + 1] = colour.1;
        buffer[offset + 2] = colour.2;
        buffer[offset + 3] = 0xFF;
    }
}

/// The straight per-pixel tilemap walk, the output matches the fetcher path.
fn scanline_walk(
    vram: &[[u8; VRAM_BANK_SIZE]; 2],
    regs: &LineRegisters,
    ly: u8,
    cgb_mode: bool,
    cgb_attributes: bool,
) -> [FifoPixel; RESOLUTION_WIDTH] {
    let lcdc = LcdControl::from_bits_truncate(regs.lcdc);
    let mut line = [FifoPixel::default(); RESOLUTION_WIDTH];

    let window_start = if window_on_line(regs, ly, cgb_mode) {
        (regs.wx as i16 - 7).max(0) as usize
    } else {
        RESOLUTION_WIDTH
    };

    for (x, pixel) in line.iter_mut().enumerate() {
        *pixel = if x >= window_start {
            let window_x = (x as i16 - (regs.wx as i16 - 7)) as u16;
            let map_base = if lcdc.contains(LcdControl::WINDOW_MAP_SELECT) {
                0x1C00
            } else {
                0x1800
            };
            map_pixel(
                vram,
                lcdc,
                map_base,
                window_x,
                regs.win_line as u16,
                cgb_attributes,
            )
        } else {
            let map_base = if lcdc.contains(LcdControl::BG_TILE_MAP_SELECT) {
                0x1C00
            } else {
                0x1800
            };
            let map_x = regs.scx.wrapping_add(x as u8) as u16;
            let map_y = regs.scy.wrapping_add(ly) as u16;
            map_pixel(vram, lcdc, map_base, map_x, map_y, cgb_attributes)
        };
    }

    line
}

fn map_pixel(
    vram: &[[u8; VRAM_BANK_SIZE]; 2],
    lcdc: LcdControl,
    map_base: usize,
    map_x: u16,
    map_y: u16,
    cgb_attributes: bool,
) -> FifoPixel {
    let map_index = map_base + (map_y / 8) as usize * 32 + (map_x / 8) as usize % 32;
    let tile_index = vram[0][map_index];
    let attrs = if cgb_attributes {
        AttributeFlags::from_bits_truncate(vram[1][map_index])
    } else {
        AttributeFlags::empty()
    };

    let mut line_in_tile = map_y % 8;
    if attrs.contains(AttributeFlags::Y_FLIP) {
        line_in_tile = 7 - line_in_tile;
    }
    let mut column = (map_x % 8) as u8;
    if attrs.contains(AttributeFlags::X_FLIP) {
        column = 7 - column;
    }

    let bank = if cgb_attributes { attrs.vram_bank() } else { 0 };
    let offset = fetcher::tile_data_offset(lcdc, tile_index) + line_in_tile as usize * 2;

    FifoPixel {
        index: pixel_from_tile_row(vram[bank][offset], vram[bank][offset + 1], column),
        attrs,
    }
}

fn background_colour(
    ppu: &PPU,
    regs: &LineRegisters,
    pixel: FifoPixel,
    cgb: bool,
    cgb_attributes: bool,
    greys: &DisplayColour,
) -> RGB {
    if cgb {
        if ppu.dmg_compat() {
            ppu.bg_cram
                .colour(0, Palette(regs.bgp).shade(pixel.index))
        } else if cgb_attributes {
            ppu.bg_cram
                .colour(pixel.attrs.cgb_palette_number(), pixel.index)
        } else {
            ppu.bg_cram.colour(0, pixel.index)
        }
    } else {
        greys.get_colour(Palette(regs.bgp).shade(pixel.index))
    }
}

fn sprite_colour(
    ppu: &PPU,
    regs: &LineRegisters,
    sprite: &SpriteAttribute,
    index: u8,
    cgb: bool,
    greys: &DisplayColour,
) -> RGB {
    let dmg_palette = if sprite.flags.contains(AttributeFlags::PALETTE_NUMBER) {
        Palette(regs.obp1)
    } else {
        Palette(regs.obp0)
    };

    if cgb {
        if ppu.dmg_compat() {
            let palette = sprite.flags.contains(AttributeFlags::PALETTE_NUMBER) as usize;
            ppu.obj_cram.colour(palette, dmg_palette.shade(index))
        } else {
            ppu.obj_cram
                .colour(sprite.flags.cgb_palette_number(), index)
        }
    } else {
        greys.get_colour(dmg_palette.shade(index))
    }
}

/// Select up to ten sprites covering this line, walking OAM top-down.
fn visible_sprites(
    oam: &[u8; OAM_SIZE],
    ly: u8,
    tall: bool,
) -> ArrayVec<[SpriteAttribute; SPRITES_PER_LINE]> {
    let height = if tall { 16i16 } else { 8 };
    let mut sprites = ArrayVec::new();

    for entry in oam.chunks_exact(4) {
        let line = ly as i16 - (entry[0] as i16 - 16);
        if line >= 0 && line < height {
            if sprites.len() == SPRITES_PER_LINE {
                break;
            }
            sprites.push(SpriteAttribute {
                y: entry[0],
                x: entry[1],
                tile: entry[2],
                flags: AttributeFlags::from_bits_truncate(entry[3]),
            });
        }
    }

    sprites
}

/// The colour index of `sprite` at screen column `x`, `None` when the sprite
/// doesn't cover the column or its pixel is transparent.
fn sprite_pixel(
    vram: &[[u8; VRAM_BANK_SIZE]; 2],
    sprite: &SpriteAttribute,
    ly: u8,
    x: usize,
    tall: bool,
    cgb: bool,
) -> Option<u8> {
    let screen_x = sprite.x as i16 - 8;
    let column = x as i16 - screen_x;
    if !(0..8).contains(&column) {
        return None;
    }

    let height = if tall { 16i16 } else { 8 };
    let mut line = ly as i16 - (sprite.y as i16 - 16);
    if sprite.flags.contains(AttributeFlags::Y_FLIP) {
        line = height - 1 - line;
    }

    let tile = if tall {
        (sprite.tile & 0xFE) + (line >= 8) as u8
    } else {
        sprite.tile
    };

    let column = if sprite.flags.contains(AttributeFlags::X_FLIP) {
        7 - column
    } else {
        column
    } as u8;

    let bank = if cgb { sprite.flags.vram_bank() } else { 0 };
    let offset = tile as usize * 16 + (line % 8) as usize * 2;
    let index = pixel_from_tile_row(vram[bank][offset], vram[bank][offset + 1], column);

    if index != 0 {
        Some(index)
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn compose_sprites(
    ppu: &PPU,
    regs: &LineRegisters,
    lcdc: LcdControl,
    ly: u8,
    bg_line: &[FifoPixel; RESOLUTION_WIDTH],
    colours: &mut [RGB; RESOLUTION_WIDTH],
    cgb: bool,
    greys: &DisplayColour,
) {
    let tall = lcdc.contains(LcdControl::SPRITE_SIZE);
    let selected = visible_sprites(&ppu.oam, ly, tall);

    // On DMG a lower X coordinate beats OAM order; the stable sort keeps
    // OAM order as the tie-break. CGB uses OAM order outright.
    let ordered: Vec<SpriteAttribute> = if cgb {
        selected.iter().copied().collect()
    } else {
        selected.iter().copied().sorted_by_key(|sprite| sprite.x).collect()
    };

    for x in 0..RESOLUTION_WIDTH {
        for sprite in &ordered {
            let index = match sprite_pixel(&ppu.vram, sprite, ly, x, tall, cgb) {
                Some(index) => index,
                None => continue,
            };

            // The highest-priority opaque sprite claims the pixel; losing to
            // the background does not let sprites behind it show through.
            let obj_wins = if cgb {
                !lcdc.contains(LcdControl::BG_WINDOW_PRIORITY)
                    || bg_line[x].index == 0
                    || (!bg_line[x].attrs.contains(AttributeFlags::OBJ_TO_BG_PRIORITY)
                        && !sprite.flags.contains(AttributeFlags::OBJ_TO_BG_PRIORITY))
            } else {
                !sprite.flags.contains(AttributeFlags::OBJ_TO_BG_PRIORITY)
                    || bg_line[x].index == 0
            };

            if obj_wins {
                colours[x] = sprite_colour(ppu, regs, sprite, index, cgb, greys);
            }
            break;
        }
    }
}
