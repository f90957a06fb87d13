use crate::game::{ClientBullet, KillFeedEntry, PlayerView};
use crate::shop::{to_tokens, Catalog, CatalogItem, ItemKind, Notice, Ownership};
use macroquad::prelude::*;
use shared::{QuitSummary, Vec3, MAX_HEALTH, PLAYER_RADIUS};

/// Screen pixels per world unit.
const PIXELS_PER_UNIT: f32 = 20.0;

/// Shop slots per page; picked with the digit keys.
pub const SHOP_PAGE_SIZE: usize = 9;

const BACKGROUND: Color = Color::new(0.10, 0.10, 0.10, 1.0);
const GRID: Color = Color::new(0.18, 0.18, 0.18, 1.0);

/// Parses `#rrggbb`. Anything else falls back to grey.
pub fn parse_hex_color(hex: &str) -> Color {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 {
        return GRAY;
    }
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
    };
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) => Color::from_rgba(r, g, b, 255),
        _ => GRAY,
    }
}

/// Shop overlay state: open or closed, and which page of the catalog shows.
#[derive(Debug, Clone)]
pub struct ShopPanel {
    open: bool,
    page: usize,
}

impl ShopPanel {
    pub fn new() -> Self {
        Self { open: false, page: 0 }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(catalog: &Catalog) -> usize {
        catalog.len().div_ceil(SHOP_PAGE_SIZE).max(1)
    }

    pub fn next_page(&mut self, catalog: &Catalog) {
        self.page = (self.page + 1).min(Self::page_count(catalog) - 1);
    }

    pub fn prev_page(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    pub fn visible<'a>(&self, catalog: &'a Catalog) -> &'a [CatalogItem] {
        let items = catalog.items();
        let start = (self.page * SHOP_PAGE_SIZE).min(items.len());
        let end = (start + SHOP_PAGE_SIZE).min(items.len());
        &items[start..end]
    }

    /// The item under a one-based slot on the current page.
    pub fn pick(&self, catalog: &Catalog, slot: usize) -> Option<(ItemKind, u32)> {
        if !self.open || slot == 0 {
            return None;
        }
        self.visible(catalog).get(slot - 1).map(|item| (item.kind, item.id))
    }
}

impl Default for ShopPanel {
    fn default() -> Self {
        Self::new()
    }
}

/// One shop row: slot, item, price and what the player already holds.
pub fn shop_line(slot: usize, item: &CatalogItem, owned: &Ownership) -> String {
    let mut text = format!("{}. {} {}  {} tokens", slot + 1, item.kind, item.name, item.price);
    if let (Some(damage), Some(rate)) = (item.damage, item.fire_rate) {
        text.push_str(&format!("  dmg {} / {:.1}/s", damage, rate));
    }
    match (item.kind, owned.count(item)) {
        (_, 0) => {}
        (ItemKind::Skin, _) => text.push_str("  [owned]"),
        (ItemKind::Weapon, count) => text.push_str(&format!("  [x{}]", count)),
    }
    text
}

/// Everything drawn in one frame besides the arena itself.
pub struct Hud<'a> {
    pub local_id: Option<u32>,
    pub kill_feed: Vec<&'a KillFeedEntry>,
    /// Ledger balance in base units.
    pub balance: u128,
    pub owned: &'a Ownership,
    pub notice: Option<&'a Notice>,
    pub catalog: &'a Catalog,
    pub shop: &'a ShopPanel,
    pub purchasing: bool,
    pub fake_ping_ms: u64,
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    /// Draws the arena centred on the local player, or on the origin before
    /// the Host has welcomed us.
    pub fn render(&mut self, players: &[PlayerView], bullets: &[ClientBullet], hud: &Hud) {
        self.width = screen_width();
        self.height = screen_height();
        clear_background(BACKGROUND);

        let camera = players
            .iter()
            .find(|player| player.is_local)
            .map(|player| player.position)
            .unwrap_or(Vec3::ZERO);

        self.draw_grid(camera);

        for bullet in bullets {
            let (x, y) = self.to_screen(bullet.position, camera);
            draw_circle(x, y, 3.0, YELLOW);
        }

        for player in players {
            self.draw_player(player, camera);
        }

        self.draw_scoreboard(players, hud);
        self.draw_kill_feed(&hud.kill_feed);

        if hud.shop.is_open() {
            self.draw_shop(hud);
        }
        if let Some(notice) = hud.notice {
            let color = if notice.is_error() { RED } else { GREEN };
            let size = measure_text(notice.text(), None, 20, 1.0);
            draw_text(notice.text(), (self.width - size.width) / 2.0, self.height - 20.0, 20.0, color);
        }
    }

    fn to_screen(&self, world: Vec3, camera: Vec3) -> (f32, f32) {
        (
            self.width / 2.0 + (world.x - camera.x) * PIXELS_PER_UNIT,
            self.height / 2.0 + (world.z - camera.z) * PIXELS_PER_UNIT,
        )
    }

    fn draw_grid(&self, camera: Vec3) {
        let spacing = 5.0 * PIXELS_PER_UNIT;
        let offset_x = (self.width / 2.0 - camera.x * PIXELS_PER_UNIT).rem_euclid(spacing);
        let offset_y = (self.height / 2.0 - camera.z * PIXELS_PER_UNIT).rem_euclid(spacing);

        let mut x = offset_x;
        while x < self.width {
            draw_line(x, 0.0, x, self.height, 1.0, GRID);
            x += spacing;
        }
        let mut y = offset_y;
        while y < self.height {
            draw_line(0.0, y, self.width, y, 1.0, GRID);
            y += spacing;
        }
    }

    fn draw_player(&self, player: &PlayerView, camera: Vec3) {
        let (x, y) = self.to_screen(player.position, camera);
        let radius = PLAYER_RADIUS * PIXELS_PER_UNIT;

        let mut color = parse_hex_color(&player.color);
        if player.dead {
            color.a = 0.3;
        }
        draw_circle(x, y, radius, color);
        if player.is_local {
            draw_circle_lines(x, y, radius + 2.0, 2.0, WHITE);
        }

        // Facing, in the same screen mapping as movement.
        let tip_x = x + player.facing.sin() * radius * 1.6;
        let tip_y = y + player.facing.cos() * radius * 1.6;
        draw_line(x, y, tip_x, tip_y, 2.0, WHITE);

        let bar_width = radius * 2.5;
        let bar_y = y - radius - 10.0;
        let fill = f32::from(player.health) / f32::from(MAX_HEALTH);
        draw_rectangle(x - bar_width / 2.0, bar_y, bar_width, 4.0, DARKGRAY);
        draw_rectangle(x - bar_width / 2.0, bar_y, bar_width * fill, 4.0, GREEN);

        let label = format!("{} [{}]", player.name, player.weapon);
        let size = measure_text(&label, None, 14, 1.0);
        draw_text(&label, x - size.width / 2.0, bar_y - 4.0, 14.0, WHITE);
    }

    fn draw_scoreboard(&self, players: &[PlayerView], hud: &Hud) {
        let status = match hud.local_id {
            Some(id) => format!("Player {}", id),
            None => "Connecting...".to_string(),
        };
        draw_text(&status, 10.0, 20.0, 18.0, WHITE);

        if let Some(local) = players.iter().find(|player| player.is_local) {
            let stats = format!(
                "K {}  D {}  HP {}  {}",
                local.kills, local.deaths, local.health, local.animation
            );
            draw_text(&stats, 10.0, 40.0, 18.0, WHITE);
        }

        let tokens = format!("Tokens: {}", to_tokens(hud.balance));
        draw_text(&tokens, 10.0, 60.0, 18.0, GOLD);

        let mut line = format!("{} players", players.len());
        if hud.fake_ping_ms > 0 {
            line.push_str(&format!("  +{}ms", hud.fake_ping_ms));
        }
        draw_text(&line, 10.0, 80.0, 14.0, LIGHTGRAY);
        draw_text("Tab: shop  Q/Esc: quit", 10.0, self.height - 10.0, 14.0, LIGHTGRAY);
    }

    fn draw_kill_feed(&self, feed: &[&KillFeedEntry]) {
        for (i, entry) in feed.iter().enumerate() {
            let text = format!("{} > {}", entry.killer, entry.victim);
            let size = measure_text(&text, None, 16, 1.0);
            draw_text(&text, self.width - size.width - 10.0, 20.0 + i as f32 * 18.0, 16.0, ORANGE);
        }
    }

    fn draw_shop(&self, hud: &Hud) {
        let panel_w = 420.0;
        let panel_h = 60.0 + SHOP_PAGE_SIZE as f32 * 24.0;
        let left = (self.width - panel_w) / 2.0;
        let top = (self.height - panel_h) / 2.0;

        draw_rectangle(left, top, panel_w, panel_h, Color::new(0.0, 0.0, 0.0, 0.85));
        draw_rectangle_lines(left, top, panel_w, panel_h, 2.0, WHITE);

        let title = format!(
            "Shop  page {}/{}  (Left/Right)",
            hud.shop.page() + 1,
            ShopPanel::page_count(hud.catalog)
        );
        draw_text(&title, left + 10.0, top + 24.0, 18.0, WHITE);

        let tokens = to_tokens(hud.balance);
        for (slot, item) in hud.shop.visible(hud.catalog).iter().enumerate() {
            let affordable = tokens >= item.price;
            let color = if affordable { WHITE } else { GRAY };
            let text = shop_line(slot, item, hud.owned);
            draw_text(&text, left + 10.0, top + 50.0 + slot as f32 * 24.0, 16.0, color);
        }

        if hud.purchasing {
            draw_text("Processing...", left + 10.0, top + panel_h - 8.0, 16.0, YELLOW);
        }
    }

    /// Shown once the Host has acknowledged our quit.
    pub fn render_summary(&mut self, summary: &QuitSummary) {
        clear_background(BACKGROUND);
        let lines = [
            "Session over".to_string(),
            format!("Kills: {}", summary.kills),
            format!("Deaths: {}", summary.deaths),
            format!("XP: {}", summary.xp),
            "Press Esc to close".to_string(),
        ];
        for (i, line) in lines.iter().enumerate() {
            let size = measure_text(line, None, 28, 1.0);
            draw_text(
                line,
                (screen_width() - size.width) / 2.0,
                screen_height() / 3.0 + i as f32 * 36.0,
                28.0,
                WHITE,
            );
        }
    }

    pub fn render_disconnected(&mut self, reason: &str) {
        clear_background(BACKGROUND);
        let text = format!("Disconnected: {}", reason);
        let size = measure_text(&text, None, 24, 1.0);
        draw_text(&text, (screen_width() - size.width) / 2.0, screen_height() / 2.0, 24.0, RED);
    }
}
