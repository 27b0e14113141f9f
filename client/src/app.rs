use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use pilji_engine::{
    ConnectionState, GovernedLookup, LookupError, MemorySurface, ParcelCollection, ParcelEngine,
    ParcelLookup, PersistenceAdapter,
};
use pilji_shared::{OwnerInfo, PALETTE, ParcelColor, ParcelId};

use crate::canvas;
use crate::net::{self, HttpLookup, RemoteSync};
use crate::storage::{BrowserLocalStore, BrowserSessionStore};
use crate::viewport::Viewport;

type ClientEngine = ParcelEngine<MemorySurface, BrowserLocalStore, BrowserSessionStore>;
type ClientLookup = GovernedLookup<HttpLookup, fn() -> f64>;

fn now_ms() -> f64 {
    js_sys::Date::now()
}

thread_local! {
    static ENGINE: RefCell<Option<ClientEngine>> = const { RefCell::new(None) };
    static LOOKUP: Rc<ClientLookup> =
        Rc::new(GovernedLookup::new(HttpLookup, "vworld", now_ms as fn() -> f64));
    static REMOTE: RefCell<Option<RemoteSync>> = const { RefCell::new(None) };
}

/// All engine access goes through here; handlers are inert until the
/// restoration pipeline has run and installed the engine.
fn with_engine<R>(f: impl FnOnce(&mut ClientEngine) -> R) -> Option<R> {
    ENGINE.with(|cell| cell.borrow_mut().as_mut().map(f))
}

/// Drive one pending remote replication, then chase any snapshot that was
/// coalesced while the push was in flight.
fn pump_remote_sync() {
    if REMOTE.with(|r| r.borrow().is_none()) {
        return;
    }
    let Some(Some(write)) = with_engine(|engine| engine.take_remote_write()) else {
        return;
    };
    let Some(remote) = REMOTE.with(|r| r.borrow().clone()) else {
        return;
    };
    spawn_local(async move {
        let result = remote.push(write).await;
        with_engine(|engine| engine.complete_remote_write(result));
        let dirty = with_engine(|engine| engine.durable().has_pending_remote()).unwrap_or(false);
        if dirty {
            pump_remote_sync();
        }
    });
}

fn show_toast(toast: RwSignal<Option<String>>, message: impl Into<String>) {
    toast.set(Some(message.into()));
    spawn_local(async move {
        gloo_timers::future::TimeoutFuture::new(4_000).await;
        toast.set(None);
    });
}

fn canvas_size(canvas_ref: NodeRef<leptos::html::Canvas>) -> (f64, f64) {
    canvas_ref
        .get_untracked()
        .map(|canvas| {
            (
                canvas.client_width().max(1) as f64,
                canvas.client_height().max(1) as f64,
            )
        })
        .unwrap_or((1280.0, 720.0))
}

fn optional_field(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[component]
pub fn App() -> impl IntoView {
    // Bumped after every engine mutation; the draw effect keys off it.
    let render_epoch: RwSignal<u64> = RwSignal::new(0);
    let mode: RwSignal<ParcelCollection> = RwSignal::new(ParcelCollection::Click);
    let connection: RwSignal<ConnectionState> = RwSignal::new(ConnectionState::Offline);
    let toast: RwSignal<Option<String>> = RwSignal::new(None);
    let selected: RwSignal<Option<(ParcelCollection, ParcelId)>> = RwSignal::new(None);
    let search_query: RwSignal<String> = RwSignal::new(String::new());
    let owner_name: RwSignal<String> = RwSignal::new(String::new());
    let owner_address: RwSignal<String> = RwSignal::new(String::new());
    let owner_contact: RwSignal<String> = RwSignal::new(String::new());
    let owner_memo: RwSignal<String> = RwSignal::new(String::new());
    let viewport: RwSignal<Viewport> =
        RwSignal::new(Viewport::centered_on(126.978, 37.566, 1280.0, 720.0));
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
    let drag_anchor: RwSignal<Option<(f64, f64)>> = RwSignal::new(None);
    let drag_moved: RwSignal<bool> = RwSignal::new(false);

    // Boot: config → engine → restore, all before handlers can touch state.
    spawn_local(async move {
        let config = net::fetch_config().await;
        let remote_enabled = config.sync.is_some();
        if let Some(target) = config.sync {
            REMOTE.with(|r| *r.borrow_mut() = Some(RemoteSync::new(target)));
        }

        ENGINE.with(|cell| {
            let mut engine = ParcelEngine::new(
                MemorySurface::new(),
                PersistenceAdapter::new(BrowserLocalStore, remote_enabled),
                BrowserSessionStore,
            );
            engine.subscribe_connection(move |state| connection.set(state));
            let summary = engine.restore();
            web_sys::console::info_1(
                &format!(
                    "restored {} search / {} click parcels ({} skipped)",
                    summary.search_restored, summary.click_restored, summary.skipped
                )
                .into(),
            );
            *cell.borrow_mut() = Some(engine);
        });

        if let Some(current) = with_engine(|engine| engine.mode()) {
            mode.set(current);
        }
        render_epoch.update(|n| *n += 1);
    });

    // Redraw on every epoch bump or viewport change.
    Effect::new(move || {
        render_epoch.get();
        let vp = viewport.get();
        let Some(canvas) = canvas_ref.get() else {
            return;
        };
        let canvas: HtmlCanvasElement = canvas;
        let width = canvas.client_width().max(1) as f64;
        let height = canvas.client_height().max(1) as f64;
        canvas.set_width(width as u32);
        canvas.set_height(height as u32);
        let Some(ctx) = canvas
            .get_context("2d")
            .ok()
            .flatten()
            .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
        else {
            return;
        };
        with_engine(|engine| canvas::draw(&ctx, engine.surface(), &vp, width, height));
    });

    let select_parcel = move |which: ParcelCollection, id: ParcelId| {
        if let Some(Some(record)) = with_engine(|engine| {
            engine
                .registry()
                .get(which, &id)
                .map(|r| r.owner_info.clone())
        }) {
            let info = record;
            owner_name.set(info.as_ref().and_then(|i| i.name.clone()).unwrap_or_default());
            owner_address.set(
                info.as_ref()
                    .and_then(|i| i.address.clone())
                    .unwrap_or_default(),
            );
            owner_contact.set(
                info.as_ref()
                    .and_then(|i| i.contact.clone())
                    .unwrap_or_default(),
            );
            owner_memo.set(info.as_ref().and_then(|i| i.memo.clone()).unwrap_or_default());
        }
        selected.set(Some((which, id)));
    };

    let handle_map_click = move |sx: f64, sy: f64| {
        let (lon, lat) = viewport.get_untracked().screen_to_world(sx, sy);

        // A click on an already-tracked parcel selects it without spending
        // a lookup call.
        if let Some(Some((which, id))) = with_engine(|engine| {
            engine
                .parcel_at(lon, lat)
                .map(|record| (record.collection, record.id.clone()))
        }) {
            select_parcel(which, id);
            return;
        }

        let lookup = LOOKUP.with(Rc::clone);
        spawn_local(async move {
            match lookup.lookup_point(lon, lat).await {
                Ok(Some(feature)) => {
                    match with_engine(|engine| engine.ingest_click_result(feature)) {
                        Some(Ok(id)) => select_parcel(ParcelCollection::Click, id),
                        Some(Err(e)) => show_toast(toast, format!("필지 저장 실패: {e}")),
                        None => {}
                    }
                    render_epoch.update(|n| *n += 1);
                    pump_remote_sync();
                }
                Ok(None) => show_toast(toast, "해당 위치에서 필지를 찾지 못했습니다"),
                Err(LookupError::RateLimited) => {
                    show_toast(toast, "요청이 너무 잦습니다. 잠시 후 다시 시도하세요")
                }
                Err(LookupError::Timeout) => {
                    show_toast(toast, "응답 시간 초과 — 필지를 찾지 못했습니다")
                }
                Err(e) => show_toast(toast, format!("필지 조회 실패: {e}")),
            }
        });
    };

    let run_search = move || {
        let query = search_query.get_untracked().trim().to_string();
        if query.is_empty() {
            return;
        }
        let lookup = LOOKUP.with(Rc::clone);
        spawn_local(async move {
            match lookup.lookup_address(&query).await {
                Ok(Some(feature)) => {
                    let bounds = feature.geometry.bounds();
                    match with_engine(|engine| {
                        engine.ingest_search_result(feature, now_ms() as i64)
                    }) {
                        Some(Ok(id)) => {
                            mode.set(ParcelCollection::Search);
                            select_parcel(ParcelCollection::Search, id);
                            if let Some(bounds) = bounds {
                                let (w, h) = canvas_size(canvas_ref);
                                viewport.update(|vp| vp.fit_bounds(bounds, w, h));
                            }
                        }
                        Some(Err(e)) => show_toast(toast, format!("검색 결과 저장 실패: {e}")),
                        None => {}
                    }
                    render_epoch.update(|n| *n += 1);
                }
                Ok(None) => show_toast(toast, "검색 결과가 없습니다"),
                Err(LookupError::RateLimited) => {
                    show_toast(toast, "요청이 너무 잦습니다. 잠시 후 다시 시도하세요")
                }
                Err(LookupError::Timeout) => {
                    show_toast(toast, "응답 시간 초과 — 다시 시도하세요")
                }
                Err(e) => show_toast(toast, format!("주소 검색 실패: {e}")),
            }
        });
    };

    let on_toggle_mode = move |_| {
        if let Some(next) = with_engine(|engine| engine.toggle_mode()) {
            mode.set(next);
            render_epoch.update(|n| *n += 1);
        }
    };

    let apply_color = move |css: &str| {
        let Some((which, id)) = selected.get_untracked() else {
            show_toast(toast, "먼저 필지를 선택하세요");
            return;
        };
        let color = ParcelColor::from_css(css);
        match with_engine(|engine| {
            engine.set_parcel_color(which, &id, color, now_ms() as i64)
        }) {
            Some(Ok(migrated)) => {
                if migrated {
                    // The colored copy now lives in the click collection.
                    selected.set(Some((ParcelCollection::Click, id)));
                }
                render_epoch.update(|n| *n += 1);
                pump_remote_sync();
            }
            Some(Err(e)) => show_toast(toast, format!("색상 변경 실패: {e}")),
            None => {}
        }
    };

    let on_save_owner = move |_| {
        let Some((which, id)) = selected.get_untracked() else {
            show_toast(toast, "먼저 필지를 선택하세요");
            return;
        };
        if which != ParcelCollection::Click {
            show_toast(toast, "소유자 정보는 클릭 수집 필지에만 저장됩니다");
            return;
        }
        let info = OwnerInfo {
            name: optional_field(&owner_name.get_untracked()),
            address: optional_field(&owner_address.get_untracked()),
            contact: optional_field(&owner_contact.get_untracked()),
            memo: optional_field(&owner_memo.get_untracked()),
            saved_at: Utc::now(),
        };
        match with_engine(|engine| engine.save_owner_info(&id, info)) {
            Some(Ok(())) => {
                show_toast(toast, "소유자 정보가 저장되었습니다");
                render_epoch.update(|n| *n += 1);
                pump_remote_sync();
            }
            Some(Err(e)) => show_toast(toast, format!("저장 실패: {e}")),
            None => {}
        }
    };

    let on_delete = move |_| {
        let Some((which, id)) = selected.get_untracked() else {
            return;
        };
        match with_engine(|engine| engine.remove_parcel(which, &id, now_ms() as i64)) {
            Some(Ok(_)) => {
                selected.set(None);
                render_epoch.update(|n| *n += 1);
                pump_remote_sync();
            }
            Some(Err(e)) => show_toast(toast, format!("삭제 실패: {e}")),
            None => {}
        }
    };

    let on_clear = move |_| {
        let confirmed = web_sys::window()
            .and_then(|w| {
                w.confirm_with_message("현재 모드의 필지를 모두 삭제할까요?")
                    .ok()
            })
            .unwrap_or(false);
        if !confirmed {
            return;
        }
        let which = mode.get_untracked();
        match with_engine(|engine| engine.clear_collection(which, now_ms() as i64)) {
            Some(Ok(cleared)) => {
                selected.set(None);
                show_toast(toast, format!("{cleared}개 필지를 삭제했습니다"));
                render_epoch.update(|n| *n += 1);
                pump_remote_sync();
            }
            Some(Err(e)) => show_toast(toast, format!("삭제 실패: {e}")),
            None => {}
        }
    };

    let on_pointer_down = move |ev: web_sys::PointerEvent| {
        drag_anchor.set(Some((ev.offset_x() as f64, ev.offset_y() as f64)));
        drag_moved.set(false);
    };
    let on_pointer_move = move |ev: web_sys::PointerEvent| {
        let Some((ax, ay)) = drag_anchor.get_untracked() else {
            return;
        };
        let (x, y) = (ev.offset_x() as f64, ev.offset_y() as f64);
        let (dx, dy) = (x - ax, y - ay);
        if dx.abs() + dy.abs() > 2.0 {
            drag_moved.set(true);
            viewport.update(|vp| vp.pan(dx, dy));
            drag_anchor.set(Some((x, y)));
        }
    };
    let on_pointer_up = move |ev: web_sys::PointerEvent| {
        let was_click = drag_anchor.get_untracked().is_some() && !drag_moved.get_untracked();
        drag_anchor.set(None);
        if was_click {
            handle_map_click(ev.offset_x() as f64, ev.offset_y() as f64);
        }
    };
    let on_wheel = move |ev: web_sys::WheelEvent| {
        ev.prevent_default();
        viewport.update(|vp| {
            vp.zoom_at(ev.delta_y(), ev.offset_x() as f64, ev.offset_y() as f64)
        });
    };

    // Selected-parcel summary, recomputed after every engine mutation.
    let selected_summary = move || -> Option<(String, String, bool)> {
        render_epoch.get();
        let (which, id) = selected.get()?;
        with_engine(|engine| {
            engine.registry().get(which, &id).map(|record| {
                (
                    record.display_label.clone(),
                    record.color.as_css().to_string(),
                    record.owner_info.is_some(),
                )
            })
        })
        .flatten()
    };

    let connection_badge = move || {
        let state = connection.get();
        let (label, color) = match state {
            ConnectionState::Offline => ("오프라인", "#5a5860"),
            ConnectionState::Syncing => ("동기화 중", "#f5c542"),
            ConnectionState::Synced => ("동기화 완료", "#4caf50"),
            ConnectionState::Error => ("동기화 오류", "#ff5252"),
        };
        view! {
            <span style=format!(
                "padding: 2px 8px; border-radius: 10px; font-size: 0.7rem; border: 1px solid {color}; color: {color};"
            )>{label}</span>
        }
    };

    view! {
        <div style="display: flex; height: 100%;">
            <div style="flex: 1; position: relative; overflow: hidden;">
                <canvas
                    node_ref=canvas_ref
                    style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none; cursor: crosshair;"
                    on:pointerdown=on_pointer_down
                    on:pointermove=on_pointer_move
                    on:pointerup=on_pointer_up
                    on:wheel=on_wheel
                />
                <div style="position: absolute; top: 10px; left: 10px; display: flex; gap: 6px; align-items: center; background: rgba(16,19,28,0.85); padding: 6px 8px; border-radius: 8px; border: 1px solid #282c3e;">
                    <input
                        type="text"
                        placeholder="주소 검색 (예: 종로구 사직동 344-1)"
                        style="width: 240px; background: #1a1d2a; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; padding: 4px 8px;"
                        prop:value=move || search_query.get()
                        on:input=move |ev| search_query.set(event_target_value(&ev))
                        on:keydown=move |ev: web_sys::KeyboardEvent| {
                            if ev.key() == "Enter" {
                                run_search();
                            }
                        }
                    />
                    <button
                        style="background: #2979ff; color: white; border: none; border-radius: 4px; padding: 4px 10px;"
                        on:click=move |_| run_search()
                    >
                        "검색"
                    </button>
                    <button
                        style="background: #1a1d2a; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; padding: 4px 10px;"
                        on:click=on_toggle_mode
                    >
                        {move || match mode.get() {
                            ParcelCollection::Search => "검색 모드",
                            ParcelCollection::Click => "클릭 모드",
                        }}
                    </button>
                    <button
                        style="background: #1a1d2a; color: #ff8a80; border: 1px solid #282c3e; border-radius: 4px; padding: 4px 10px;"
                        on:click=on_clear
                    >
                        "모두 삭제"
                    </button>
                </div>
                <div style="position: absolute; top: 12px; right: 12px;">{connection_badge}</div>
                {move || {
                    toast.get().map(|message| view! {
                        <div style="position: absolute; bottom: 20px; left: 50%; transform: translateX(-50%); background: #161921; border: 1px solid #282c3e; border-radius: 6px; padding: 8px 14px; font-size: 0.8rem;">
                            {message}
                        </div>
                    })
                }}
            </div>
            <aside style="width: 280px; background: #161921; border-left: 1px solid #282c3e; padding: 12px; display: flex; flex-direction: column; gap: 10px; overflow-y: auto;">
                {move || match selected_summary() {
                    Some((label, color, has_owner)) => view! {
                        <div>
                            <div style="font-size: 1rem; font-weight: 700;">{label}</div>
                            <div style="font-size: 0.72rem; color: #9a9590; margin-top: 2px;">
                                {format!("색상: {color}")}
                                {has_owner.then_some(" · 소유자 정보 저장됨")}
                            </div>
                        </div>
                    }.into_any(),
                    None => view! {
                        <div style="font-size: 0.8rem; color: #9a9590;">
                            "지도를 클릭하거나 주소를 검색해 필지를 선택하세요"
                        </div>
                    }.into_any(),
                }}
                <div>
                    <div style="font-size: 0.72rem; color: #9a9590; margin-bottom: 4px;">"색상"</div>
                    <div style="display: flex; flex-wrap: wrap; gap: 4px;">
                        {PALETTE
                            .iter()
                            .map(|hex| {
                                view! {
                                    <button
                                        style=format!(
                                            "width: 24px; height: 24px; border-radius: 4px; border: 1px solid #282c3e; background: {hex};"
                                        )
                                        on:click=move |_| apply_color(hex)
                                    />
                                }
                            })
                            .collect::<Vec<_>>()}
                        <button
                            style="height: 24px; border-radius: 4px; border: 1px dashed #5a5860; background: none; color: #9a9590; font-size: 0.65rem; padding: 0 6px;"
                            on:click=move |_| apply_color("transparent")
                        >
                            "투명"
                        </button>
                    </div>
                </div>
                <div style="display: flex; flex-direction: column; gap: 6px;">
                    <div style="font-size: 0.72rem; color: #9a9590;">"소유자 정보"</div>
                    <input
                        type="text"
                        placeholder="이름"
                        style="background: #1a1d2a; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; padding: 4px 8px;"
                        prop:value=move || owner_name.get()
                        on:input=move |ev| owner_name.set(event_target_value(&ev))
                    />
                    <input
                        type="text"
                        placeholder="주소"
                        style="background: #1a1d2a; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; padding: 4px 8px;"
                        prop:value=move || owner_address.get()
                        on:input=move |ev| owner_address.set(event_target_value(&ev))
                    />
                    <input
                        type="text"
                        placeholder="연락처"
                        style="background: #1a1d2a; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; padding: 4px 8px;"
                        prop:value=move || owner_contact.get()
                        on:input=move |ev| owner_contact.set(event_target_value(&ev))
                    />
                    <textarea
                        placeholder="메모"
                        rows=3
                        style="background: #1a1d2a; color: #e2e0d8; border: 1px solid #282c3e; border-radius: 4px; padding: 4px 8px; resize: vertical;"
                        prop:value=move || owner_memo.get()
                        on:input=move |ev| owner_memo.set(event_target_value(&ev))
                    />
                    <div style="display: flex; gap: 6px;">
                        <button
                            style="flex: 1; background: #2979ff; color: white; border: none; border-radius: 4px; padding: 6px;"
                            on:click=on_save_owner
                        >
                            "저장"
                        </button>
                        <button
                            style="background: #1a1d2a; color: #ff8a80; border: 1px solid #282c3e; border-radius: 4px; padding: 6px 10px;"
                            on:click=on_delete
                        >
                            "삭제"
                        </button>
                    </div>
                </div>
            </aside>
        </div>
    }
}
