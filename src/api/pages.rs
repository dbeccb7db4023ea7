use chrono::{DateTime, Utc};
use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::gallery::{RoomGallery, TaskEntry, TaskGallery};
use crate::share::photo_path;
use crate::storage::models::{Photo, Room};

const STYLES: &str = "\
body{font-family:system-ui,sans-serif;margin:0;padding:1.5rem;background:#f6f6f4;color:#1d1d1b}\
header{margin-bottom:1.5rem}\
h1{margin:0 0 .25rem;font-size:1.5rem}\
.meta{color:#666;font-size:.9rem}\
.grid{display:grid;grid-template-columns:repeat(auto-fill,minmax(220px,1fr));gap:1rem}\
figure{margin:0;background:#fff;border-radius:6px;overflow:hidden}\
figure img{width:100%;display:block}\
figcaption{padding:.5rem;font-size:.85rem}\
.task{margin:2rem 0}\
.badge{display:inline-block;padding:0 .4rem;border-radius:4px;background:#e4e4df;font-size:.8rem;margin-right:.25rem}\
.empty{color:#888;font-style:italic}";

fn layout(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="robots" content="noindex, nofollow";
                title { (title) }
                style { (PreEscaped(STYLES)) }
            }
            body { (body) }
        }
    }
}

fn expiry_note(expires_at: DateTime<Utc>) -> Markup {
    let when = expires_at.format("%Y-%m-%d %H:%M UTC").to_string();
    html! {
        p.meta { "Shared view. This link expires " (when) "." }
    }
}

fn room_line(room: &Room) -> String {
    let mut parts = vec![room.name.clone()];
    if let Some(building) = &room.building {
        parts.push(building.clone());
    }
    if let Some(floor) = &room.floor {
        parts.push(format!("floor {floor}"));
    }
    parts.join(" / ")
}

fn photo_grid(photos: &[Photo], secret: &str) -> Markup {
    html! {
        @if photos.is_empty() {
            p.empty { "No photos yet." }
        } @else {
            div.grid {
                @for photo in photos {
                    figure {
                        img src=(photo_path(photo.id, secret))
                            alt=(photo.caption.as_deref().unwrap_or("Task photo"))
                            loading="lazy";
                        @if let Some(caption) = &photo.caption {
                            figcaption { (caption) }
                        }
                    }
                }
            }
        }
    }
}

pub fn task_gallery(gallery: &TaskGallery, secret: &str) -> Markup {
    let task = &gallery.task;
    layout(
        &task.title,
        html! {
            header {
                h1 { (task.title) }
                p.meta {
                    span.badge { (task.status.label()) }
                    span.badge { (task.priority.label()) }
                    @if let Some(room) = &gallery.room {
                        (room_line(room))
                    }
                }
                @if let Some(description) = &task.description {
                    p { (description) }
                }
                (expiry_note(gallery.expires_at))
            }
            (photo_grid(&gallery.photos, secret))
        },
    )
}

fn task_section(entry: &TaskEntry, secret: &str) -> Markup {
    html! {
        section.task {
            h2 { (entry.task.title) }
            p.meta {
                span.badge { (entry.task.status.label()) }
                span.badge { (entry.task.priority.label()) }
                (entry.photos.len()) " photo(s)"
            }
            (photo_grid(&entry.photos, secret))
        }
    }
}

pub fn room_gallery(gallery: &RoomGallery, secret: &str) -> Markup {
    layout(
        &gallery.room.name,
        html! {
            header {
                h1 { (room_line(&gallery.room)) }
                p.meta {
                    (gallery.tasks.len()) " task(s), " (gallery.photo_count) " photo(s)"
                }
                p.meta {
                    @for (status, count) in &gallery.by_status {
                        span.badge { (status.label()) ": " (count) }
                    }
                }
                p.meta {
                    @for (priority, count) in gallery.by_priority.iter().rev() {
                        span.badge { (priority.label()) ": " (count) }
                    }
                }
                (expiry_note(gallery.expires_at))
            }
            @if gallery.tasks.is_empty() {
                p.empty { "No tasks recorded for this room." }
            }
            @for entry in &gallery.tasks {
                (task_section(entry, secret))
            }
        },
    )
}

/// Shown for every denied link, whatever the reason
pub fn link_unavailable() -> Markup {
    layout(
        "Link unavailable",
        html! {
            h1 { "Link invalid or expired" }
            p { "This shared link is not valid. Ask the person who sent it for a new one." }
        },
    )
}

pub fn service_unavailable() -> Markup {
    layout(
        "Temporarily unavailable",
        html! {
            h1 { "Temporarily unavailable" }
            p { "Please try again in a few minutes." }
        },
    )
}
