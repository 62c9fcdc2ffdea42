use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{
        AdminUserOut, AdminUserUpdate, DashboardStats, OcrStatistics, StatsQuery, UsersPage,
        start_of_day,
    },
    repo,
};
use crate::{
    auth::{
        repo::is_unique_violation,
        repo_types::User,
        services::{is_valid_email, normalize_email},
    },
    error::{AppError, AppResult},
    images::services as images,
    ocr,
    settings::{self, SystemSettings},
    state::AppState,
};

pub const MAX_PAGE_SIZE: i64 = 100;
const DASHBOARD_RECENT_USERS: i64 = 10;
const TOP_USERS: i64 = 10;
const CHART_DAYS: i64 = 30;

/// Clamps page to >= 1 and page size to 1..=100; returns `(page, limit, offset)`.
pub fn paginate(page: i64, limit: i64) -> (i64, i64, i64) {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    (page, limit, (page - 1) * limit)
}

pub fn total_pages(total: i64, limit: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

pub async fn dashboard(st: &AppState) -> AppResult<DashboardStats> {
    let now = OffsetDateTime::now_utc();
    let db = &st.db;

    Ok(DashboardStats {
        total_users: repo::count_users(db, false).await?,
        premium_users: repo::count_users(db, true).await?,
        total_requests: repo::count_requests(db, None, None).await?,
        requests_today: repo::count_requests(db, Some(start_of_day(now)), None).await?,
        recent_users: repo::list_user_stats(db, DASHBOARD_RECENT_USERS, 0).await?,
        requests_by_day: repo::requests_by_day(db, now - Duration::days(CHART_DAYS)).await?,
        language_distribution: repo::language_distribution(db).await?,
        user_activity: repo::user_activity(db, TOP_USERS).await?,
    })
}

pub async fn list_users(st: &AppState, page: i64, limit: i64) -> AppResult<UsersPage> {
    let (page, limit, offset) = paginate(page, limit);
    let total = repo::count_users(&st.db, false).await?;
    let users = repo::list_user_stats(&st.db, limit, offset).await?;
    Ok(UsersPage {
        users,
        total,
        page,
        limit,
        total_pages: total_pages(total, limit),
    })
}

/// Rejects changes an admin must not make to their own account.
pub fn check_self_update(actor: &User, target: Uuid, update: &AdminUserUpdate) -> AppResult<()> {
    if actor.id != target {
        return Ok(());
    }
    if update.is_admin == Some(false) {
        return Err(AppError::bad_request("You cannot revoke your own admin rights"));
    }
    if update.is_active == Some(false) {
        return Err(AppError::bad_request("You cannot deactivate your own account"));
    }
    Ok(())
}

pub async fn update_user(
    st: &AppState,
    actor: &User,
    user_id: Uuid,
    mut update: AdminUserUpdate,
) -> AppResult<AdminUserOut> {
    check_self_update(actor, user_id, &update)?;

    if let Some(email) = update.email.take() {
        let email = normalize_email(&email);
        if !is_valid_email(&email) {
            return Err(AppError::bad_request("Invalid email"));
        }
        if repo::email_taken_by_other(&st.db, &email, user_id).await? {
            return Err(AppError::bad_request("Email already in use"));
        }
        update.email = Some(email);
    }

    let updated = repo::update_user(
        &st.db,
        user_id,
        update.email.as_deref(),
        update.is_active,
        update.is_premium,
        update.is_admin,
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::bad_request("Email already in use")
        } else {
            AppError::Internal(e)
        }
    })?
    .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    info!(admin_id = %actor.id, user_id = %user_id, "user updated");
    Ok(updated.into())
}

pub async fn delete_user(st: &AppState, actor: &User, user_id: Uuid) -> AppResult<()> {
    if actor.id == user_id {
        return Err(AppError::bad_request("You cannot delete your own account"));
    }

    let keys = ocr::image_keys_by_user(&st.db, user_id).await?;
    if !repo::delete_user(&st.db, user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    let removed = images::delete_inputs(st, &keys).await;
    if removed < keys.len() {
        warn!(user_id = %user_id, left = keys.len() - removed, "some archived images were not removed");
    }
    info!(admin_id = %actor.id, user_id = %user_id, "user deleted");
    Ok(())
}

pub async fn ocr_stats(st: &AppState, q: StatsQuery) -> AppResult<OcrStatistics> {
    let now = OffsetDateTime::now_utc();
    let db = &st.db;
    let (_, limit, offset) = paginate(q.page, q.limit);
    let since = q.date_filter.unwrap_or_default().start(now);
    let language = q
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    let filtered = repo::count_requests(db, since, language).await?;

    Ok(OcrStatistics {
        total_requests: repo::count_requests(db, None, None).await?,
        requests_today: repo::count_requests(db, Some(start_of_day(now)), None).await?,
        requests_by_day: repo::requests_by_day(db, now - Duration::days(CHART_DAYS)).await?,
        top_users: repo::top_users(db, TOP_USERS).await?,
        language_distribution: repo::language_distribution(db).await?,
        requests: repo::list_requests(db, since, language, limit, offset).await?,
        total_pages: total_pages(filtered, limit),
    })
}

pub async fn get_settings(st: &AppState) -> AppResult<SystemSettings> {
    Ok(settings::load(&st.db).await?)
}

pub async fn update_settings(
    st: &AppState,
    actor: &User,
    mut new: SystemSettings,
) -> AppResult<SystemSettings> {
    new.validate(st.config.limits.max_upload_mb)
        .map_err(AppError::BadRequest)?;
    let saved = settings::save(&st.db, &new).await?;
    info!(
        admin_id = %actor.id,
        maintenance = saved.maintenance_mode,
        request_limit = saved.request_limit,
        "settings updated"
    );
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> User {
        User {
            id: Uuid::new_v4(),
            email: "root@example.com".into(),
            username: "root".into(),
            password_hash: String::new(),
            is_active: true,
            is_premium: false,
            is_admin: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(paginate(1, 10), (1, 10, 0));
        assert_eq!(paginate(3, 20), (3, 20, 40));
        assert_eq!(paginate(0, 0), (1, 1, 0));
        assert_eq!(paginate(-2, 1_000), (1, 100, 0));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn admin_cannot_demote_or_disable_self() {
        let me = admin();
        let demote = AdminUserUpdate {
            is_admin: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            check_self_update(&me, me.id, &demote),
            Err(AppError::BadRequest(_))
        ));

        let disable = AdminUserUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(check_self_update(&me, me.id, &disable).is_err());

        let premium = AdminUserUpdate {
            is_premium: Some(true),
            ..Default::default()
        };
        assert!(check_self_update(&me, me.id, &premium).is_ok());
        assert!(check_self_update(&me, Uuid::new_v4(), &demote).is_ok());
    }

    #[tokio::test]
    async fn self_delete_is_rejected_before_touching_db() {
        let st = AppState::fake();
        let me = admin();
        let err = delete_user(&st, &me, me.id).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected_before_saving() {
        let st = AppState::fake();
        let bad = SystemSettings {
            max_file_size: 0,
            ..Default::default()
        };
        let err = update_settings(&st, &admin(), bad).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
