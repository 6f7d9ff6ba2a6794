//! Call selectors.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use prism_memo::{
    BulkMemoizer, CacheStats, MemoError, Selector, SelectorCache, SelectorError, create_selector,
};

use super::{CallProps, ParticipantProps};
use crate::state::{
    CallClientState, CallId, CallStatus, LocalParticipantState, MediaStreamType, ParticipantId,
    RemoteParticipantState, StreamId, VideoViewState,
};

type Participants = Arc<BTreeMap<ParticipantId, Arc<RemoteParticipantState>>>;

/// Whether a remote participant is muted. `None` if the participant is not
/// in the call.
pub fn is_muted_selector()
-> impl Selector<CallClientState, ParticipantProps, Output = Option<bool>> {
    type Input = (CallId, ParticipantId, Option<Arc<RemoteParticipantState>>);

    create_selector(
        "is_muted",
        |state: &CallClientState, props: &ParticipantProps| -> Input {
            (
                props.call_id.clone(),
                props.participant_id.clone(),
                state.participant(&props.call_id, &props.participant_id).cloned(),
            )
        },
        |(_, _, participant): &Input| Ok(participant.as_ref().map(|p| p.is_muted)),
    )
}

/// Call header view model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatusView {
    /// Connection status.
    pub status: CallStatus,
    /// Local microphone muted.
    pub is_muted: bool,
    /// Local screen share running.
    pub is_screen_sharing_on: bool,
    /// Recording indicator.
    pub is_recording_active: bool,
    /// Remote participants currently in the call.
    pub remote_participant_count: usize,
}

/// Status header of one call. `None` once the call left the active set.
pub fn call_status_selector()
-> impl Selector<CallClientState, CallProps, Output = Option<Arc<CallStatusView>>> {
    type Input = (CallId, Option<(CallStatus, Arc<LocalParticipantState>, bool, usize)>);

    create_selector(
        "call_status",
        |state: &CallClientState, props: &CallProps| -> Input {
            let slice = state.call(&props.call_id).map(|call| {
                (
                    call.state,
                    Arc::clone(&call.local_participant),
                    call.is_recording_active,
                    call.remote_participants.len(),
                )
            });
            (props.call_id.clone(), slice)
        },
        |(_, slice): &Input| {
            Ok(slice.as_ref().map(|(status, local, is_recording_active, count)| {
                Arc::new(CallStatusView {
                    status: *status,
                    is_muted: local.is_muted,
                    is_screen_sharing_on: local.is_screen_sharing_on,
                    is_recording_active: *is_recording_active,
                    remote_participant_count: *count,
                })
            }))
        },
    )
}

/// Row of the participant list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantView {
    /// Participant id.
    pub id: ParticipantId,
    /// Name shown in the row.
    pub display_name: Option<String>,
    /// Connection status.
    pub state: CallStatus,
    /// Microphone muted.
    pub is_muted: bool,
    /// Currently speaking.
    pub is_speaking: bool,
    /// Has an available camera stream.
    pub is_video_on: bool,
    /// Has an available screen-share stream.
    pub is_screen_sharing: bool,
}

type ParticipantViewFn = fn(&ParticipantId, &Arc<RemoteParticipantState>) -> Arc<ParticipantView>;
type ParticipantListOutput = Option<Arc<Vec<Arc<ParticipantView>>>>;
type ListInput = (CallId, Option<Participants>);

fn has_available(participant: &RemoteParticipantState, kind: MediaStreamType) -> bool {
    participant
        .video_streams
        .values()
        .any(|stream| stream.media_stream_type == kind && stream.is_available)
}

fn participant_view(
    id: &ParticipantId,
    participant: &Arc<RemoteParticipantState>,
) -> Arc<ParticipantView> {
    Arc::new(ParticipantView {
        id: id.clone(),
        display_name: participant.display_name.clone(),
        state: participant.state,
        is_muted: participant.is_muted,
        is_speaking: participant.is_speaking,
        is_video_on: has_available(participant, MediaStreamType::Video),
        is_screen_sharing: has_available(participant, MediaStreamType::ScreenSharing),
    })
}

/// Participant list of one call, ordered by participant id.
///
/// The list is rebuilt whenever any participant changes; rows are memoized
/// per participant, so an unchanged participant keeps its `Arc` across
/// rebuilds and its row does not re-render.
pub struct ParticipantListSelector {
    list: SelectorCache<ListInput, ParticipantListOutput>,
    rows: BulkMemoizer<
        ParticipantId,
        Arc<RemoteParticipantState>,
        Arc<ParticipantView>,
        ParticipantViewFn,
    >,
}

impl Default for ParticipantListSelector {
    fn default() -> Self {
        Self {
            list: SelectorCache::new(),
            rows: BulkMemoizer::new(participant_view as ParticipantViewFn),
        }
    }
}

impl ParticipantListSelector {
    /// Fresh selector with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of the per-row memoizer.
    pub fn row_stats(&self) -> CacheStats {
        self.rows.stats()
    }

    /// Rows kept from the last rebuild.
    pub fn cached_rows(&self) -> usize {
        self.rows.len()
    }
}

impl Selector<CallClientState, CallProps> for ParticipantListSelector {
    type Output = ParticipantListOutput;

    fn select(
        &mut self,
        state: &CallClientState,
        props: &CallProps,
    ) -> Result<Self::Output, SelectorError> {
        let participants =
            state.call(&props.call_id).map(|call| Arc::clone(&call.remote_participants));
        let rows = &mut self.rows;
        self.list.try_get_or_compute(
            (props.call_id.clone(), participants),
            |(_, participants): &ListInput| -> Result<Self::Output, SelectorError> {
                let Some(participants) = participants else {
                    rows.run_round(|_| Ok::<_, MemoError>(()))?;
                    return Ok(None);
                };
                let views = rows.run_round(|round| {
                    participants
                        .iter()
                        .map(|(id, participant)| round.call(id.clone(), Arc::clone(participant)))
                        .collect::<Result<Vec<_>, MemoError>>()
                })?;
                Ok(Some(Arc::new(views)))
            },
        )
    }

    fn name(&self) -> &'static str {
        "participant_list"
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.list.stats())
    }
}

/// Local participant's tile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTile {
    /// Name shown on the tile.
    pub display_name: Option<String>,
    /// Microphone muted.
    pub is_muted: bool,
    /// Sharing the screen.
    pub is_screen_sharing_on: bool,
}

/// Remote participant's tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTile {
    /// Participant id.
    pub participant_id: ParticipantId,
    /// Name shown on the tile.
    pub display_name: Option<String>,
    /// Microphone muted.
    pub is_muted: bool,
    /// Speaking ring.
    pub is_speaking: bool,
    /// Camera stream rendered in the tile, if any.
    pub video_stream_id: Option<StreamId>,
    /// Whether that stream currently has media.
    pub is_video_available: bool,
    /// View attached to that stream.
    pub view: Option<VideoViewState>,
}

/// Remote screen share shown in the large pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenShareTile {
    /// Sharing participant.
    pub participant_id: ParticipantId,
    /// Screen-share stream.
    pub stream_id: StreamId,
    /// View attached to the stream.
    pub view: Option<VideoViewState>,
}

/// Video gallery of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoGalleryView {
    /// Local tile.
    pub local: LocalTile,
    /// Remote tiles, dominant speakers first.
    pub remote: Vec<Arc<RemoteTile>>,
    /// First available remote screen share.
    pub screen_share: Option<ScreenShareTile>,
}

type RemoteTileFn = fn(&ParticipantId, &Arc<RemoteParticipantState>) -> Arc<RemoteTile>;
type GallerySlice = (Arc<LocalParticipantState>, Participants, Arc<Vec<ParticipantId>>);
type GalleryInput = (CallId, Option<GallerySlice>);

fn remote_tile(id: &ParticipantId, participant: &Arc<RemoteParticipantState>) -> Arc<RemoteTile> {
    let camera = participant
        .video_streams
        .values()
        .find(|stream| stream.media_stream_type == MediaStreamType::Video);
    Arc::new(RemoteTile {
        participant_id: id.clone(),
        display_name: participant.display_name.clone(),
        is_muted: participant.is_muted,
        is_speaking: participant.is_speaking,
        video_stream_id: camera.map(|stream| stream.id),
        is_video_available: camera.is_some_and(|stream| stream.is_available),
        view: camera.and_then(|stream| stream.view),
    })
}

/// Whether a participant gets a gallery tile.
fn in_gallery(participant: &RemoteParticipantState) -> bool {
    !matches!(participant.state, CallStatus::Idle | CallStatus::Disconnected)
}

/// Gallery order: dominant speakers in speaker order, then everyone else by id.
///
/// A speaker listed twice keeps its first position.
fn gallery_order<'a>(
    participants: &'a Participants,
    dominant: &[ParticipantId],
) -> Vec<(&'a ParticipantId, &'a Arc<RemoteParticipantState>)> {
    let mut seen = BTreeSet::new();
    let mut ordered: Vec<_> = dominant
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| participants.get_key_value(id))
        .collect();
    ordered.extend(participants.iter().filter(|(id, _)| !seen.contains(id.as_str())));
    ordered.retain(|(_, participant)| in_gallery(participant));
    ordered
}

/// Video gallery of one call.
///
/// Tiles are memoized per participant. Screen shares are taken from the
/// participants in gallery order.
pub struct VideoGallerySelector {
    gallery: SelectorCache<GalleryInput, Option<Arc<VideoGalleryView>>>,
    tiles: BulkMemoizer<ParticipantId, Arc<RemoteParticipantState>, Arc<RemoteTile>, RemoteTileFn>,
}

impl Default for VideoGallerySelector {
    fn default() -> Self {
        Self {
            gallery: SelectorCache::new(),
            tiles: BulkMemoizer::new(remote_tile as RemoteTileFn),
        }
    }
}

impl VideoGallerySelector {
    /// Fresh selector with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of the per-tile memoizer.
    pub fn tile_stats(&self) -> CacheStats {
        self.tiles.stats()
    }
}

impl Selector<CallClientState, CallProps> for VideoGallerySelector {
    type Output = Option<Arc<VideoGalleryView>>;

    fn select(
        &mut self,
        state: &CallClientState,
        props: &CallProps,
    ) -> Result<Self::Output, SelectorError> {
        let slice = state.call(&props.call_id).map(|call| {
            (
                Arc::clone(&call.local_participant),
                Arc::clone(&call.remote_participants),
                Arc::clone(&call.dominant_speakers),
            )
        });
        let tiles = &mut self.tiles;
        self.gallery.try_get_or_compute(
            (props.call_id.clone(), slice),
            |(_, slice): &GalleryInput| -> Result<Self::Output, SelectorError> {
                let Some((local, participants, dominant)) = slice else {
                    tiles.run_round(|_| Ok::<_, MemoError>(()))?;
                    return Ok(None);
                };
                let ordered = gallery_order(participants, dominant);

                let remote = tiles.run_round(|round| {
                    ordered
                        .iter()
                        .map(|(id, participant)| {
                            round.call((*id).clone(), Arc::clone(*participant))
                        })
                        .collect::<Result<Vec<_>, MemoError>>()
                })?;

                let screen_share = ordered.iter().find_map(|(id, participant)| {
                    participant
                        .video_streams
                        .values()
                        .find(|s| {
                            s.media_stream_type == MediaStreamType::ScreenSharing && s.is_available
                        })
                        .map(|stream| ScreenShareTile {
                            participant_id: (*id).clone(),
                            stream_id: stream.id,
                            view: stream.view,
                        })
                });

                Ok(Some(Arc::new(VideoGalleryView {
                    local: LocalTile {
                        display_name: local.display_name.clone(),
                        is_muted: local.is_muted,
                        is_screen_sharing_on: local.is_screen_sharing_on,
                    },
                    remote,
                    screen_share,
                })))
            },
        )
    }

    fn name(&self) -> &'static str {
        "video_gallery"
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.gallery.stats())
    }
}
